use crate::models::{Address, SizeBand, YearBand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path and query, starting with `/`
    pub path: String,
    /// Sent as `application/x-www-form-urlencoded` on POST
    pub form: Vec<(String, String)>,
    pub cookie: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            form: Vec::new(),
            cookie: None,
        }
    }

    pub fn post_form<K, V>(path: impl Into<String>, form: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::Post,
            path: path.into(),
            form: form.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Value of a form field, if set
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// First `Set-Cookie` header, verbatim
    pub set_cookie: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// One rent-index query tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RentQuery {
    pub address: Address,
    pub size: SizeBand,
    pub year: YearBand,
}

impl RentQuery {
    pub fn new(address: Address, size: SizeBand, year: YearBand) -> Self {
        Self {
            address,
            size,
            year,
        }
    }

    /// All SizeBand × YearBand queries for one address
    pub fn all_for(address: &Address) -> impl Iterator<Item = RentQuery> + '_ {
        SizeBand::ALL.into_iter().flat_map(move |size| {
            YearBand::ALL
                .into_iter()
                .map(move |year| RentQuery::new(address.clone(), size, year))
        })
    }
}
