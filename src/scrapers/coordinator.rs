use crate::models::{
    Address, AddressInventory, HouseRents, RentIndex, SizeBand, StreetRents, YearBand,
};
use crate::scrapers::session::RentQuerySession;
use crate::scrapers::traits::Transport;
use crate::scrapers::types::RentQuery;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// A street whose house numbers have all been scraped
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStreet {
    pub street: String,
    pub rents: StreetRents,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeStats {
    pub queries: usize,
    pub resolved: usize,
    pub no_result: usize,
    pub skipped_streets: usize,
}

/// Fans the inventory out into rent queries and gathers the RentIndex.
///
/// Each house number is one worker running its 15 queries in sequence and
/// owning its own subtree. At most `max_concurrency` workers run at once.
pub struct ScrapeCoordinator {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    sink: Option<UnboundedSender<CompletedStreet>>,
}

/// The one structure workers share; guarded at street-insertion granularity
struct Shared {
    index: RentIndex,
    /// Workers still running per street
    remaining: HashMap<String, usize>,
}

impl ScrapeCoordinator {
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            sink: None,
        }
    }

    /// Every street is sent here as soon as its last house number finishes
    pub fn with_sink(mut self, sink: UnboundedSender<CompletedStreet>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn run_full_scrape(&self, inventory: &AddressInventory) -> (RentIndex, ScrapeStats) {
        let resolved = AtomicUsize::new(0);
        let queries = AtomicUsize::new(0);

        let mut addresses = Vec::new();
        let mut skipped_streets = 0;
        for (street, housenumbers) in inventory.streets() {
            let before = addresses.len();
            addresses.extend(
                housenumbers
                    .iter()
                    .map(|nr| Address::new(street, nr.as_str()))
                    .filter(|address| !address.is_unknown()),
            );
            if addresses.len() == before {
                warn!(street, "No known house numbers, skipping");
                skipped_streets += 1;
            }
        }

        let mut remaining = HashMap::new();
        for address in &addresses {
            *remaining.entry(address.street.clone()).or_default() += 1;
        }
        let shared = Mutex::new(Shared {
            index: RentIndex::new(),
            remaining,
        });

        info!(
            host = self.transport.host(),
            addresses = addresses.len(),
            queries = addresses.len() * SizeBand::ALL.len() * YearBand::ALL.len(),
            "Starting rent index scrape"
        );

        let mut workers: FuturesUnordered<_> = addresses
            .iter()
            .map(|address| {
                let shared = &shared;
                let resolved = &resolved;
                let queries = &queries;
                async move {
                    // the semaphore is never closed
                    let _permit = self.permits.acquire().await.ok();

                    let rents = self.scrape_house(address, resolved, queries).await;
                    self.insert(shared, address, rents).await;
                }
            })
            .collect();

        while workers.next().await.is_some() {}
        drop(workers);

        let queries = queries.into_inner();
        let resolved = resolved.into_inner();
        let stats = ScrapeStats {
            queries,
            resolved,
            no_result: queries - resolved,
            skipped_streets,
        };
        info!(
            queries = stats.queries,
            resolved = stats.resolved,
            no_result = stats.no_result,
            skipped_streets = stats.skipped_streets,
            "Rent index scrape finished"
        );

        (shared.into_inner().index, stats)
    }

    /// All size/year combinations of one house number, built without locking
    async fn scrape_house(
        &self,
        address: &Address,
        resolved: &AtomicUsize,
        queries: &AtomicUsize,
    ) -> HouseRents {
        let mut rents = HouseRents::new();

        for query in RentQuery::all_for(address) {
            let record = RentQuerySession::new(self.transport.as_ref(), &query)
                .resolve()
                .await;

            queries.fetch_add(1, Ordering::Relaxed);
            if !record.is_empty() {
                resolved.fetch_add(1, Ordering::Relaxed);
            }

            rents.entry(query.size).or_default().insert(query.year, record);
        }

        debug!(street = %address.street, housenumber = %address.housenumber, "House number done");
        rents
    }

    async fn insert(&self, shared: &Mutex<Shared>, address: &Address, rents: HouseRents) {
        let completed = {
            let mut shared = shared.lock().await;
            let Shared { index, remaining } = &mut *shared;

            let street = index.entry(address.street.clone()).or_default();
            street.insert(address.housenumber.clone(), rents);

            let left = remaining.entry(address.street.clone()).or_insert(1);
            *left -= 1;
            (*left == 0).then(|| CompletedStreet {
                street: address.street.clone(),
                rents: street.clone(),
            })
        };

        let Some(completed) = completed else {
            return;
        };
        info!(street = %completed.street, housenumbers = completed.rents.len(), "Street complete");

        if let Some(sink) = &self.sink {
            if sink.send(completed).is_err() {
                warn!(street = %address.street, "Output sink closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RentRecord, UNKNOWN_HOUSENUMBERS};
    use crate::scrapers::fake::{ok, result_page, FakeTransport};
    use crate::scrapers::types::{HttpResponse, Method};
    use std::time::Duration;

    /// Echoes the submitted tuple back as the quality label via the cookie
    fn echo_site() -> FakeTransport {
        FakeTransport::new(|request| match request.method {
            Method::Post => {
                let cookie = format!(
                    "SID={}|{}|{}|{}; path=/",
                    request.form_value("strasse").unwrap(),
                    request.form_value("nummer").unwrap(),
                    request.form_value("form_3").unwrap(),
                    request.form_value("form_4").unwrap()
                );
                Ok(HttpResponse {
                    status: 302,
                    set_cookie: Some(cookie),
                    body: String::new(),
                })
            }
            Method::Get => {
                let tuple = request.cookie.as_deref().unwrap().trim_start_matches("SID=");
                ok(result_page(tuple, "10", "5,00 €/m² - 6,00"))
            }
        })
    }

    fn inventory(streets: usize, housenumbers: usize) -> AddressInventory {
        (0..streets)
            .map(|s| {
                (
                    format!("Straße {s}"),
                    (1..=housenumbers).map(|n| n.to_string()).collect(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_tuple_lands_once_in_its_own_leaf() {
        let transport = Arc::new(echo_site().with_delay(Duration::from_millis(1)));
        let coordinator = ScrapeCoordinator::new(transport.clone(), 6);
        let inventory = inventory(3, 4);

        let (index, stats) = coordinator.run_full_scrape(&inventory).await;

        assert_eq!(stats.queries, 3 * 4 * 15);
        assert_eq!(stats.resolved, stats.queries);
        assert_eq!(transport.requests().len(), 2 * stats.queries);
        assert!(transport.peak_in_flight() <= 6);

        assert_eq!(index.len(), 3);
        let mut leaves = 0;
        for (street, houses) in &index {
            assert_eq!(houses.len(), 4);
            for (nr, sizes) in houses {
                assert_eq!(sizes.len(), SizeBand::ALL.len());
                for (size, years) in sizes {
                    assert_eq!(years.len(), YearBand::ALL.len());
                    for (year, record) in years {
                        let expected = format!("{street}|{nr}|{}|{}", size.code(), year.code());
                        assert_eq!(record.location_quality, expected);
                        leaves += 1;
                    }
                }
            }
        }
        assert_eq!(leaves, 3 * 4 * 15);
    }

    #[tokio::test]
    async fn test_end_to_end_single_address() {
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse {
                status: 200,
                set_cookie: Some("SID=abc; path=/".into()),
                body: result_page("gut", "12", "5,20-7,40"),
            })
        });
        let coordinator = ScrapeCoordinator::new(Arc::new(transport), 2);
        let mut inventory = AddressInventory::new();
        inventory.insert("Teststraße", vec!["1".into()]);

        let (index, _) = coordinator.run_full_scrape(&inventory).await;

        let record = &index["Teststraße"]["1"][&SizeBand::Between50And80][&YearBand::Between1991And2001];
        assert_eq!(
            record,
            &RentRecord {
                rent_from: "5,20".into(),
                rent_to: "7,40".into(),
                location_quality: "gut".into(),
                quality_points: "12".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_no_result_is_recorded_as_empty_leaf() {
        let transport = FakeTransport::new(|_| ok("<html>kein Ergebnis</html>"));
        let coordinator = ScrapeCoordinator::new(Arc::new(transport), 2);
        let mut inventory = AddressInventory::new();
        inventory.insert("Biberweg", vec!["18".into()]);

        let (index, stats) = coordinator.run_full_scrape(&inventory).await;

        assert_eq!(stats.no_result, 15);
        let sizes = &index["Biberweg"]["18"];
        assert!(sizes.values().flat_map(|years| years.values()).all(RentRecord::is_empty));
    }

    #[tokio::test]
    async fn test_unknown_housenumbers_are_skipped() {
        let transport = Arc::new(echo_site());
        let coordinator = ScrapeCoordinator::new(transport.clone(), 2);
        let mut inventory = AddressInventory::new();
        inventory.insert("Unbekannt", vec![UNKNOWN_HOUSENUMBERS.into()]);
        inventory.insert("Biberweg", vec!["1".into()]);

        let (index, stats) = coordinator.run_full_scrape(&inventory).await;

        assert_eq!(stats.skipped_streets, 1);
        assert!(!index.contains_key("Unbekannt"));
        assert_eq!(index["Biberweg"].len(), 1);
    }

    #[tokio::test]
    async fn test_completed_streets_are_streamed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let coordinator = ScrapeCoordinator::new(Arc::new(echo_site()), 3).with_sink(tx);
        let inventory = inventory(2, 3);

        let (index, _) = coordinator.run_full_scrape(&inventory).await;
        drop(coordinator);

        let mut streamed = Vec::new();
        while let Some(completed) = rx.recv().await {
            streamed.push(completed);
        }
        streamed.sort_by(|a, b| a.street.cmp(&b.street));

        assert_eq!(streamed.len(), 2);
        for completed in streamed {
            assert_eq!(completed.rents.len(), 3);
            assert_eq!(&completed.rents, &index[&completed.street]);
        }
    }
}
