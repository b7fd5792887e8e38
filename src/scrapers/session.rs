use crate::error::ScrapeError;
use crate::models::RentRecord;
use crate::scrapers::pattern::{markers::v1 as markers, scrape};
use crate::scrapers::traits::Transport;
use crate::scrapers::types::{HttpRequest, HttpResponse, RentQuery};
use std::mem;
use tracing::debug;

pub const QUERY_PATH: &str = "/";
pub const RESULT_PATH: &str = "/result.php";

/// Where a rent query stands.
///
/// `Submitting` → `FetchingResult` → `Extracting` → `Resolved`, with any
/// step able to drop into `NoResult`. Both `Resolved` and `NoResult` are
/// terminal.
#[derive(Debug)]
pub enum SessionState {
    Submitting,
    FetchingResult { cookie: String },
    Extracting { page: String },
    Resolved(RentRecord),
    NoResult(ScrapeError),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Resolved(_) | SessionState::NoResult(_))
    }
}

/// One submit → cookie → result page round trip for a single query tuple
pub struct RentQuerySession<'a> {
    transport: &'a dyn Transport,
    query: &'a RentQuery,
    state: SessionState,
}

impl<'a> RentQuerySession<'a> {
    pub fn new(transport: &'a dyn Transport, query: &'a RentQuery) -> Self {
        Self {
            transport,
            query,
            state: SessionState::Submitting,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Performs the next transition. Does nothing once terminal.
    pub async fn step(&mut self) {
        let state = mem::replace(&mut self.state, SessionState::Submitting);
        self.state = match state {
            SessionState::Submitting => self.submit().await,
            SessionState::FetchingResult { cookie } => self.fetch_result(cookie).await,
            SessionState::Extracting { page } => match extract_record(&page) {
                Ok(record) => SessionState::Resolved(record),
                Err(e) => SessionState::NoResult(e),
            },
            terminal => terminal,
        };
    }

    /// Drives the session to a terminal state
    pub async fn run(mut self) -> Result<RentRecord, ScrapeError> {
        loop {
            match mem::replace(&mut self.state, SessionState::Submitting) {
                SessionState::Resolved(record) => return Ok(record),
                SessionState::NoResult(e) => {
                    debug!(
                        street = %self.query.address.street,
                        housenumber = %self.query.address.housenumber,
                        size = %self.query.size,
                        year = %self.query.year,
                        reason = %e,
                        "No result"
                    );
                    return Err(e);
                }
                pending => {
                    self.state = pending;
                    self.step().await;
                }
            }
        }
    }

    /// Like `run`, with every failure collapsed into the empty record
    pub async fn resolve(self) -> RentRecord {
        self.run().await.unwrap_or_default()
    }

    async fn submit(&self) -> SessionState {
        let response = match self.transport.execute(query_form(self.query)).await {
            Ok(response) => response,
            Err(e) => return SessionState::NoResult(e.into()),
        };

        match session_cookie(&response) {
            Some(cookie) if response.is_redirect() || response.is_success() => {
                SessionState::FetchingResult { cookie }
            }
            cookie => SessionState::NoResult(ScrapeError::SessionNotEstablished {
                status: response.status,
                cookie: cookie.is_some(),
            }),
        }
    }

    async fn fetch_result(&self, cookie: String) -> SessionState {
        let request = HttpRequest::get(RESULT_PATH).with_cookie(cookie);
        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => SessionState::Extracting {
                page: response.body,
            },
            Ok(response) => SessionState::NoResult(ScrapeError::ResultUnavailable(response.status)),
            Err(e) => SessionState::NoResult(e.into()),
        }
    }
}

fn query_form(query: &RentQuery) -> HttpRequest {
    let mut form = vec![
        ("submit".to_string(), "1".to_string()),
        ("strasse".to_string(), query.address.street.clone()),
        ("nummer".to_string(), query.address.housenumber.clone()),
        ("form_3".to_string(), query.size.code().to_string()),
        ("form_4".to_string(), query.year.code().to_string()),
    ];
    // remaining rating criteria, all "not applicable"
    for field in ["form_5", "form_6", "form_7", "form_8", "form_9", "form_13", "form_14", "form_23"] {
        form.push((field.to_string(), "0".to_string()));
    }
    HttpRequest::post_form(QUERY_PATH, form)
}

/// `name=value` of the first `Set-Cookie`, attributes such as `path` dropped
fn session_cookie(response: &HttpResponse) -> Option<String> {
    response
        .set_cookie
        .as_deref()
        .and_then(|header| header.split(';').next())
        .map(str::trim)
        .filter(|cookie| !cookie.is_empty())
        .map(str::to_string)
}

/// Location quality, quality points and rent range, in page order
pub fn extract_record(page: &str) -> Result<RentRecord, ScrapeError> {
    let (location_quality, pos) = scrape(page, markers::LOCATION_QUALITY_START, markers::ROW_END, 0)?;
    let (quality_points, pos) = scrape(page, markers::QUALITY_POINTS_START, markers::ROW_END, pos)?;
    let (rent_block, _) = scrape(page, markers::RENT_RANGE_START, markers::RENT_RANGE_END, pos)?;
    let (rent_from, rent_to) = split_rent_range(rent_block)?;

    Ok(RentRecord {
        rent_from,
        rent_to,
        location_quality: location_quality.trim().to_string(),
        quality_points: quality_points.trim().to_string(),
    })
}

/// `"5,20 €/m² - 7,40"` or `"5,20-7,40"` → `("5,20", "7,40")`
fn split_rent_range(block: &str) -> Result<(String, String), ScrapeError> {
    let cleaned = block
        .replace(markers::RENT_UNIT, " ")
        .replace("&nbsp;", " ")
        .replace('-', " ");

    match cleaned.split_whitespace().collect::<Vec<_>>().as_slice() {
        [from, to] => Ok((from.to_string(), to.to_string())),
        _ => Err(ScrapeError::MalformedRentRange(block.to_string())),
    }
}
