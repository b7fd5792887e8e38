use crate::error::ScrapeError;
use crate::models::{AddressInventory, UNKNOWN_HOUSENUMBERS};
use crate::scrapers::pattern::{markers::v1 as markers, scrape};
use crate::scrapers::traits::Transport;
use crate::scrapers::types::HttpRequest;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const LANDING_PATH: &str = "/";
pub const HOUSENUMBER_LOOKUP_PATH: &str = "/lib/ajax.php?strassenauswahl_%22.md5(lcg_value()).%22";

/// Discovers every street of the rent-index site and the house numbers it knows per street
pub struct AddressDiscoverer {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
}

impl AddressDiscoverer {
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Street names from the landing page's autocomplete list
    pub async fn discover_streets(
        &self,
        include: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<Vec<String>, ScrapeError> {
        let response = self.transport.execute(HttpRequest::get(LANDING_PATH)).await?;
        let mut streets = parse_streets(&response.body)?;

        if let Some(include) = include {
            streets.retain(|street| include(street));
        }

        info!(host = self.transport.host(), count = streets.len(), "Discovered streets");
        Ok(streets)
    }

    /// House numbers of one street. Any failure yields the `"..."` placeholder.
    pub async fn discover_housenumbers(&self, street: String) -> (String, Vec<String>) {
        let request = HttpRequest::post_form(
            HOUSENUMBER_LOOKUP_PATH,
            [("name", street.as_str()), ("data", "33")],
        );

        let housenumbers = match self.transport.execute(request).await {
            Ok(response) => parse_housenumbers(&response.body),
            Err(e) => {
                warn!(street = %street, error = %e, "House number lookup failed");
                vec![UNKNOWN_HOUSENUMBERS.to_string()]
            }
        };

        debug!(street = %street, count = housenumbers.len(), "Discovered house numbers");
        (street, housenumbers)
    }

    /// Streets, then house numbers per street, looked up concurrently
    pub async fn discover_address_space(
        &self,
        include: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<AddressInventory, ScrapeError> {
        let streets = self.discover_streets(include).await?;

        let mut lookups: FuturesUnordered<_> = streets
            .into_iter()
            .map(|street| async move {
                // the semaphore is never closed
                let _permit = self.permits.acquire().await.ok();
                self.discover_housenumbers(street).await
            })
            .collect();

        let mut inventory = AddressInventory::new();
        while let Some((street, housenumbers)) = lookups.next().await {
            inventory.insert(street, housenumbers);
        }

        info!(
            streets = inventory.street_count(),
            addresses = inventory.address_count(),
            "Address space discovered"
        );
        Ok(inventory)
    }
}

/// Splits the quoted, comma-separated autocomplete entries
pub fn parse_streets(html: &str) -> Result<Vec<String>, ScrapeError> {
    let (tags, _) = scrape(html, markers::STREETS_START, markers::STREETS_END, 0)?;

    Ok(tags
        .split(',')
        .map(str::trim)
        .filter(|entry| entry.chars().count() > 2)
        .map(|entry| entry.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|street| !street.is_empty())
        .collect())
}

/// Option values of the escaped `<select name="nummer">`, or the placeholder
pub fn parse_housenumbers(markup: &str) -> Vec<String> {
    match scrape(markup, markers::HOUSENUMBERS_START, markers::HOUSENUMBERS_END, 0) {
        Ok((options, _)) => options
            .split(markers::HOUSENUMBERS_SEPARATOR)
            .map(str::trim)
            .filter(|nr| !nr.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => vec![UNKNOWN_HOUSENUMBERS.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fake::{ok, FakeTransport};
    use crate::scrapers::types::Method;
    use std::time::Duration;

    const LANDING: &str = r##"<html><head>
<script>$(function() {var availableTags = ["Am Anger","Biberweg","Teststraße","Zwätzengasse"]; $( "#strassenliste" ).autocomplete({ source: availableTags });});</script>
</head></html>"##;

    fn select_markup(numbers: &[&str]) -> String {
        format!(
            "<div>{}{}{}",
            markers::HOUSENUMBERS_START,
            numbers.join(markers::HOUSENUMBERS_SEPARATOR),
            markers::HOUSENUMBERS_END
        )
    }

    fn site() -> FakeTransport {
        FakeTransport::new(|request| match request.method {
            Method::Get => ok(LANDING),
            Method::Post => match request.form_value("name") {
                Some("Biberweg") => ok(select_markup(&["1", "2", "18a"])),
                Some("Teststraße") => ok(select_markup(&["1"])),
                Some("Am Anger") => ok(select_markup(&["3"])),
                _ => ok("<div>keine Auswahl</div>"),
            },
        })
    }

    #[test]
    fn test_parse_streets() {
        let streets = parse_streets(LANDING).unwrap();
        assert_eq!(streets, ["Am Anger", "Biberweg", "Teststraße", "Zwätzengasse"]);
    }

    #[test]
    fn test_parse_streets_without_autocomplete_block() {
        let err = parse_streets("<html>Wartungsarbeiten</html>").unwrap_err();
        assert!(matches!(err, ScrapeError::MarkerNotFound(_)));
    }

    #[test]
    fn test_parse_housenumbers() {
        assert_eq!(parse_housenumbers(&select_markup(&["1", "3", "5b"])), ["1", "3", "5b"]);
    }

    #[test]
    fn test_parse_housenumbers_missing_select_gives_placeholder() {
        assert_eq!(parse_housenumbers("<div></div>"), [UNKNOWN_HOUSENUMBERS]);
    }

    #[tokio::test]
    async fn test_discover_streets_with_filter() {
        let discoverer = AddressDiscoverer::new(Arc::new(site()), 4);
        let filter = |street: &str| street.starts_with('B');
        let streets = discoverer.discover_streets(Some(&filter)).await.unwrap();
        assert_eq!(streets, ["Biberweg"]);
    }

    #[tokio::test]
    async fn test_discover_housenumbers_posts_street_name() {
        let transport = Arc::new(site());
        let discoverer = AddressDiscoverer::new(transport.clone(), 4);

        let (street, numbers) = discoverer.discover_housenumbers("Biberweg".into()).await;
        assert_eq!(street, "Biberweg");
        assert_eq!(numbers, ["1", "2", "18a"]);

        let request = &transport.requests()[0];
        assert_eq!(request.path, HOUSENUMBER_LOOKUP_PATH);
        assert_eq!(request.form_value("data"), Some("33"));
    }

    #[tokio::test]
    async fn test_discover_housenumbers_transport_failure_gives_placeholder() {
        let transport = FakeTransport::new(|request| {
            Err(crate::error::TransportError::Timeout(request.path.clone()))
        });
        let discoverer = AddressDiscoverer::new(Arc::new(transport), 1);
        let (_, numbers) = discoverer.discover_housenumbers("Biberweg".into()).await;
        assert_eq!(numbers, [UNKNOWN_HOUSENUMBERS]);
    }

    #[tokio::test]
    async fn test_discover_address_space() {
        let transport = Arc::new(site().with_delay(Duration::from_millis(5)));
        let discoverer = AddressDiscoverer::new(transport.clone(), 2);

        let inventory = discoverer.discover_address_space(None).await.unwrap();

        assert_eq!(inventory.street_count(), 4);
        assert_eq!(inventory.housenumbers("Biberweg").unwrap(), ["1", "2", "18a"]);
        assert_eq!(inventory.housenumbers("Zwätzengasse").unwrap(), [UNKNOWN_HOUSENUMBERS]);
        assert_eq!(inventory.address_count(), 6);
        assert!(transport.peak_in_flight() <= 2);
    }
}
