//! Balance aggregation over `/addresses/{address}/balances`.

use std::collections::{HashMap, HashSet};

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stamps_domain::model::{Balance, BalancePage, BalanceSummary, Cursor};
use strum_macros::AsRefStr;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    client::{path_segment, types::normalize_balance_row, Envelope, QueryParams, XcpClient},
    error::XcpError,
};

/// Page size used when walking every balance of an address.
pub const BALANCE_PAGE_LIMIT: u32 = 500;

/// Pages fetched per sweep when the node reports no `result_count`.
pub const MAX_SWEEP_PAGES: u64 = 1_000;

/// Identity used when collapsing duplicate rows of one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKeying {
    /// `{address}-{asset}-{index}`: the row position is part of the key, so
    /// rows for the same pair at different positions stay separate.
    #[default]
    Positional,
    /// `{address}-{asset}`: every row of a pair is summed into one.
    ByAsset,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BalanceKey {
    address: String,
    asset: String,
    index: Option<usize>,
}

impl BalanceKeying {
    fn key(self, balance: &Balance, index: usize) -> BalanceKey {
        BalanceKey {
            address: balance.address.clone(),
            asset: balance.cpid.clone(),
            index: match self {
                BalanceKeying::Positional => Some(index),
                BalanceKeying::ByAsset => None,
            },
        }
    }
}

/// Which balances Counterparty should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BalanceType {
    All,
    Address,
    Utxo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceQuery {
    pub limit: Option<u32>,
    pub cursor: Option<Cursor>,
    pub balance_type: Option<BalanceType>,
    pub keying: BalanceKeying,
}

/// Normalises raw rows and collapses duplicates under `keying`. The index
/// in a positional key is the row's position in `rows`.
pub fn aggregate_balances(
    default_address: &str,
    rows: &[Value],
    keying: BalanceKeying,
) -> Vec<Balance> {
    let normalized = rows.iter().enumerate().filter_map(|(index, row)| {
        normalize_balance_row(default_address, row).map(|balance| (index, balance))
    });
    merge_balances(normalized, keying)
}

/// Sums quantities of balances sharing a key, keeping first-seen order.
fn merge_balances<I>(balances: I, keying: BalanceKeying) -> Vec<Balance>
where
    I: IntoIterator<Item = (usize, Balance)>,
{
    let mut merged: Vec<Balance> = Vec::new();
    let mut positions: HashMap<BalanceKey, usize> = HashMap::new();

    for (index, balance) in balances {
        let key = keying.key(&balance, index);
        match positions.get(&key) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                existing.quantity = existing.quantity.saturating_add(balance.quantity);
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(balance);
            }
        }
    }

    merged
}

fn retain_utxo_only(balances: &mut Vec<Balance>) {
    balances.retain(Balance::is_utxo_attached);
}

fn balances_endpoint(address: &str, cpid: Option<&str>) -> Result<String, XcpError> {
    let address = path_segment(address)?;
    Ok(match cpid {
        Some(cpid) => format!("/addresses/{address}/balances/{}", path_segment(cpid)?),
        None => format!("/addresses/{address}/balances"),
    })
}

/// Upper bound on pages per sweep: one past what the first page's count
/// implies, or [`MAX_SWEEP_PAGES`] when the node sent no count.
fn sweep_page_cap(expected_total: Option<u64>) -> u64 {
    match expected_total {
        Some(total) => total.div_ceil(u64::from(BALANCE_PAGE_LIMIT)) + 1,
        None => MAX_SWEEP_PAGES,
    }
}

struct FetchedPage {
    page: BalancePage,
    /// Rows in the response before zero and UTXO filtering.
    raw_rows: usize,
    /// The node's `result_count`, if it sent one.
    reported_total: Option<u64>,
}

impl XcpClient {
    /// Fetches one page of balances for `address`, optionally narrowed to a
    /// single asset. Node exhaustion yields an empty page with `degraded`
    /// set rather than an error; only unusable path values are rejected.
    pub async fn get_balances(
        &self,
        address: &str,
        cpid: Option<&str>,
        utxo_only: bool,
        query: &BalanceQuery,
    ) -> Result<BalancePage, XcpError> {
        let endpoint = balances_endpoint(address, cpid)?;
        Ok(self
            .fetch_balance_page(&endpoint, address, utxo_only, query)
            .await
            .page)
    }

    async fn fetch_balance_page(
        &self,
        endpoint: &str,
        address: &str,
        utxo_only: bool,
        query: &BalanceQuery,
    ) -> FetchedPage {
        let mut params = QueryParams::new().with("verbose", true);
        params.set_opt("limit", query.limit);
        params.set_opt("cursor", query.cursor.as_ref());
        params.set_opt("type", query.balance_type.map(|t| t.as_ref().to_string()));

        let response = self.fetch(endpoint, &params, None).await;
        let envelope = Envelope::parse(&response);
        let raw_rows = envelope.result.len();

        let mut balances = aggregate_balances(address, &envelope.result, query.keying);
        if utxo_only {
            retain_utxo_only(&mut balances);
        }

        FetchedPage {
            page: BalancePage {
                balances,
                total: envelope.result_count.unwrap_or(raw_rows as u64),
                next_cursor: envelope.next_cursor,
                degraded: envelope.error,
            },
            raw_rows,
            reported_total: envelope.result_count,
        }
    }

    /// Walks every page for `address` with positional keying.
    pub async fn get_all_balances(
        &self,
        address: &str,
        cpid: Option<&str>,
        utxo_only: bool,
    ) -> Result<BalanceSummary, XcpError> {
        self.get_all_balances_with(address, cpid, utxo_only, BalanceKeying::Positional)
            .await
    }

    /// Walks every page for `address`. A sweep that hits a degraded page is
    /// restarted up to `max_retries` times, waiting `retry_delay × attempt`
    /// between sweeps.
    pub async fn get_all_balances_with(
        &self,
        address: &str,
        cpid: Option<&str>,
        utxo_only: bool,
        keying: BalanceKeying,
    ) -> Result<BalanceSummary, XcpError> {
        let endpoint = balances_endpoint(address, cpid)?;
        let attempts = self.config().max_retries().max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .sweep_balances(&endpoint, address, utxo_only, keying)
                .await
            {
                Ok(summary) => {
                    counter!("xcp_balance_sweeps_total", "result" => "ok").increment(1);
                    return Ok(summary);
                }
                Err(message) => {
                    counter!("xcp_balance_sweeps_total", "result" => "retry").increment(1);
                    warn!(
                        address,
                        attempt,
                        attempts,
                        error = %message,
                        "balance sweep failed"
                    );
                    last_error = message;
                    if attempt < attempts {
                        sleep(self.config().retry_delay() * attempt).await;
                    }
                }
            }
        }

        counter!("xcp_balance_sweeps_total", "result" => "failed").increment(1);
        Err(XcpError::SweepFailed {
            address: address.to_string(),
            attempts,
            message: last_error,
        })
    }

    /// One pass over every page. The first page's `result_count` is the
    /// target, compared against raw rows so filtering cannot stall the walk.
    /// Without a count the walk follows cursors until they run out.
    async fn sweep_balances(
        &self,
        endpoint: &str,
        address: &str,
        utxo_only: bool,
        keying: BalanceKeying,
    ) -> Result<BalanceSummary, String> {
        let mut collected: Vec<Balance> = Vec::new();
        let mut expected_total: Option<u64> = None;
        let mut raw_seen: u64 = 0;
        let mut pages: u64 = 0;
        let mut seen_cursors: HashSet<Cursor> = HashSet::new();
        let mut cursor: Option<Cursor> = None;

        loop {
            let query = BalanceQuery {
                limit: Some(BALANCE_PAGE_LIMIT),
                cursor: cursor.clone(),
                balance_type: None,
                keying,
            };
            let fetched = self
                .fetch_balance_page(endpoint, address, utxo_only, &query)
                .await;
            if let Some(message) = fetched.page.degraded {
                return Err(message);
            }

            pages += 1;
            if pages == 1 {
                expected_total = fetched.reported_total;
            }
            raw_seen += fetched.raw_rows as u64;
            collected.extend(fetched.page.balances);
            debug!(
                address,
                pages,
                raw_seen,
                expected_total,
                "balance page fetched"
            );

            let Some(next) = fetched.page.next_cursor else {
                break;
            };
            if fetched.raw_rows == 0 || expected_total.is_some_and(|total| raw_seen >= total) {
                break;
            }
            if !seen_cursors.insert(next.clone()) {
                warn!(address, cursor = %next, pages, "balance cursor repeated, ending sweep");
                break;
            }
            if pages >= sweep_page_cap(expected_total) {
                warn!(address, pages, "balance sweep reached its page cap");
                break;
            }
            cursor = Some(next);
        }

        // Pages are merged per page above; by-asset keying also spans pages.
        if keying == BalanceKeying::ByAsset {
            collected = merge_balances(collected.into_iter().enumerate(), keying);
        }

        Ok(BalanceSummary {
            total: expected_total.unwrap_or(collected.len() as u64),
            balances: collected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpError, HttpResponse};
    use crate::testing::{client_with, client_with_config, nodes, query_value, ScriptedHttp};
    use stamps_domain::config::XcpConfig;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn row(address: &str, asset: &str, quantity: u64, utxo: &str) -> Value {
        json!({
            "address": address,
            "asset": asset,
            "quantity": quantity,
            "utxo": utxo,
            "utxo_address": if utxo.is_empty() { "" } else { address },
            "asset_info": {"divisible": false},
        })
    }

    #[test]
    fn positional_keying_keeps_same_pair_rows() {
        let rows = vec![row("A", "X", 5, ""), row("A", "X", 3, "")];
        let balances = aggregate_balances("A", &rows, BalanceKeying::Positional);
        assert_eq!(balances.len(), 2);
        assert_eq!(
            balances.iter().map(|b| b.quantity).sum::<u64>(),
            8,
            "no quantity is dropped"
        );
    }

    #[test]
    fn by_asset_keying_sums_same_pair_rows() {
        let rows = vec![
            row("A", "X", 5, ""),
            row("A", "Y", 1, ""),
            row("A", "X", 3, "tx:1"),
        ];
        let balances = aggregate_balances("A", &rows, BalanceKeying::ByAsset);
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].cpid, "X");
        assert_eq!(balances[0].quantity, 8);
        assert_eq!(balances[1].cpid, "Y");
    }

    #[test]
    fn zero_rows_are_excluded() {
        let rows = vec![row("A", "X", 0, ""), row("A", "Y", 2, "")];
        let balances = aggregate_balances("A", &rows, BalanceKeying::Positional);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].cpid, "Y");
    }

    #[tokio::test]
    async fn single_object_response_is_normalised() {
        let http = ScriptedHttp::new(|_| {
            Ok(HttpResponse::new(
                200,
                json!({"result": {"address": "bc1qa", "asset": "STAMP", "quantity": 4}}).to_string(),
            ))
        });
        let client = client_with(nodes(1), http.clone());

        let page = client
            .get_balances("bc1qa", Some("STAMP"), false, &BalanceQuery::default())
            .await
            .unwrap();

        assert_eq!(page.balances.len(), 1);
        assert_eq!(page.balances[0].cpid, "STAMP");
        assert_eq!(page.total, 1);
        assert_eq!(
            http.last_call().unwrap(),
            "https://node1.test/v2/addresses/bc1qa/balances/STAMP?verbose=true"
        );
    }

    #[tokio::test]
    async fn utxo_only_keeps_attached_balances() {
        let http = ScriptedHttp::new(|_| {
            Ok(HttpResponse::new(
                200,
                json!({
                    "result": [
                        row("bc1qa", "X", 1, ""),
                        row("bc1qa", "Y", 2, "ab:0"),
                        row("bc1qa", "Z", 3, "cd:1"),
                    ],
                    "result_count": 3
                })
                .to_string(),
            ))
        });
        let client = client_with(nodes(1), http.clone());

        let query = BalanceQuery {
            limit: Some(50),
            balance_type: Some(BalanceType::Utxo),
            ..BalanceQuery::default()
        };
        let page = client.get_balances("bc1qa", None, true, &query).await.unwrap();

        let assets: Vec<_> = page.balances.iter().map(|b| b.cpid.as_str()).collect();
        assert_eq!(assets, vec!["Y", "Z"]);
        assert_eq!(page.total, 3);
        let url = http.last_call().unwrap();
        assert_eq!(query_value(&url, "limit").as_deref(), Some("50"));
        assert_eq!(query_value(&url, "type").as_deref(), Some("utxo"));
    }

    #[tokio::test]
    async fn degraded_page_is_empty_with_error() {
        let http = ScriptedHttp::new(|_| Err(HttpError::Network("refused".into())));
        let client = client_with(nodes(2), http);

        let page = client
            .get_balances("bc1qa", None, false, &BalanceQuery::default())
            .await
            .unwrap();
        assert!(page.balances.is_empty());
        assert_eq!(page.total, 0);
        assert!(page.degraded.unwrap().contains("refused"));
    }

    fn paged_responder(total: usize, page_size: usize) -> ScriptedHttp {
        ScriptedHttp::new(move |url| {
            let page: usize = query_value(url, "cursor")
                .map(|c| c.parse().unwrap())
                .unwrap_or(0);
            let start = page * page_size;
            let rows: Vec<Value> = (start..(start + page_size).min(total))
                .map(|i| row("bc1qa", &format!("A{i}"), 1 + i as u64, ""))
                .collect();
            let next = if start + page_size < total {
                json!(page + 1)
            } else {
                Value::Null
            };
            Ok(HttpResponse::new(
                200,
                json!({"result": rows, "next_cursor": next, "result_count": total}).to_string(),
            ))
        })
    }

    #[tokio::test]
    async fn collects_every_page() {
        let http = paged_responder(5000, 500);
        let client = client_with(nodes(1), http.clone());

        let summary = client
            .get_all_balances("bc1qa", None, false)
            .await
            .expect("sweep succeeds");

        assert_eq!(summary.total, 5000);
        assert_eq!(summary.balances.len(), 5000);
        assert_eq!(http.calls().len(), 10);
        assert!(http
            .calls()
            .iter()
            .all(|url| query_value(url, "limit").as_deref() == Some("500")));
    }

    #[tokio::test]
    async fn sweep_stops_when_cursor_runs_out() {
        let http = ScriptedHttp::new(|_| {
            Ok(HttpResponse::new(
                200,
                json!({
                    "result": [row("bc1qa", "X", 1, "")],
                    "next_cursor": null,
                    "result_count": 10
                })
                .to_string(),
            ))
        });
        let client = client_with(nodes(1), http.clone());

        let summary = client.get_all_balances("bc1qa", None, false).await.unwrap();
        assert_eq!(summary.total, 10);
        assert_eq!(summary.balances.len(), 1);
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn by_asset_sweep_merges_across_pages() {
        let http = ScriptedHttp::new(|url| {
            let body = match query_value(url, "cursor").as_deref() {
                None => json!({"result": [row("A", "X", 5, "")], "next_cursor": "p2", "result_count": 2}),
                _ => json!({"result": [row("A", "X", 3, "")], "next_cursor": null, "result_count": 2}),
            };
            Ok(HttpResponse::new(200, body.to_string()))
        });
        let client = client_with(nodes(1), http);

        let positional = client.get_all_balances("A", None, false).await.unwrap();
        assert_eq!(positional.balances.len(), 2);

        let merged = client
            .get_all_balances_with("A", None, false, BalanceKeying::ByAsset)
            .await
            .unwrap();
        assert_eq!(merged.balances.len(), 1);
        assert_eq!(merged.balances[0].quantity, 8);
    }

    #[tokio::test]
    async fn sweep_retries_after_degraded_page() {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let http = ScriptedHttp::new(move |url| {
            let second_page = query_value(url, "cursor").is_some();
            if second_page && counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(HttpResponse::new(502, "bad gateway"));
            }
            let body = if second_page {
                json!({"result": [row("A", "Y", 1, "")], "next_cursor": null, "result_count": 2})
            } else {
                json!({"result": [row("A", "X", 1, "")], "next_cursor": 1, "result_count": 2})
            };
            Ok(HttpResponse::new(200, body.to_string()))
        });
        let client = client_with(nodes(1), http.clone());

        let summary = client.get_all_balances("A", None, false).await.unwrap();
        assert_eq!(summary.balances.len(), 2);
        // first page cached, second page retried once
        assert_eq!(http.calls().len(), 3);
    }

    #[tokio::test]
    async fn sweep_gives_up_after_max_retries() {
        let http = ScriptedHttp::new(|_| Ok(HttpResponse::new(500, r#"{"error": "db locked"}"#)));
        let client = client_with(nodes(2), http.clone());

        let err = client.get_all_balances("A", None, false).await.unwrap_err();
        match err {
            XcpError::SweepFailed {
                address,
                attempts,
                message,
            } => {
                assert_eq!(address, "A");
                assert_eq!(attempts, 3);
                assert_eq!(message, "db locked");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(http.calls().len(), 6);
    }

    fn json_page(rows: Vec<Value>, next: Value, count: Option<u64>) -> Result<HttpResponse, HttpError> {
        let mut body = json!({"result": rows, "next_cursor": next});
        if let Some(count) = count {
            body["result_count"] = json!(count);
        }
        Ok(HttpResponse::new(200, body.to_string()))
    }

    #[tokio::test]
    async fn sweep_without_result_count_follows_the_cursor() {
        let http = ScriptedHttp::new(|url| {
            let (rows, next) = match query_value(url, "cursor").as_deref() {
                None => (500, json!("p2")),
                _ => (200, Value::Null),
            };
            let rows = (0..rows)
                .map(|i| row("bc1qa", &format!("A{i}"), 1, ""))
                .collect();
            json_page(rows, next, None)
        });
        let client = client_with(nodes(1), http.clone());

        let summary = client.get_all_balances("bc1qa", None, false).await.unwrap();
        assert_eq!(summary.balances.len(), 700);
        assert_eq!(summary.total, 700);
        assert_eq!(http.calls().len(), 2);
    }

    /// Answers with a single unattached row and a cursor that flips between
    /// `a` and `b`.
    fn alternating_cursor(count: u64) -> ScriptedHttp {
        ScriptedHttp::new(move |url| {
            let next = match query_value(url, "cursor").as_deref() {
                Some("a") => "b",
                _ => "a",
            };
            json_page(vec![row("bc1qa", "X", 1, "")], json!(next), Some(count))
        })
    }

    #[tokio::test]
    async fn cycling_cursor_ends_the_sweep() {
        let http = alternating_cursor(1_000_000);
        let client = client_with(nodes(1), http.clone());

        let summary = timeout(
            Duration::from_secs(5),
            client.get_all_balances("bc1qa", None, true),
        )
        .await
        .expect("sweep terminates")
        .unwrap();
        assert!(summary.balances.is_empty());
        // first page, `a`, `b`, then `a` again is refused
        assert_eq!(http.calls().len(), 3);
    }

    #[tokio::test]
    async fn filtered_rows_still_count_towards_the_total() {
        let http = alternating_cursor(5);
        let client = client_with(nodes(1), http.clone());

        let summary = timeout(
            Duration::from_secs(5),
            client.get_all_balances("bc1qa", None, true),
        )
        .await
        .expect("sweep terminates")
        .unwrap();
        assert_eq!(summary.total, 5);
        assert!(http.calls().len() <= 3);

        let http = ScriptedHttp::new(|url| {
            let page: u64 = query_value(url, "cursor")
                .map(|c| c.parse().unwrap())
                .unwrap_or(0);
            let rows = (0..BALANCE_PAGE_LIMIT)
                .map(|i| row("bc1qa", &format!("A{i}"), 1, ""))
                .collect();
            json_page(rows, json!(page + 1), Some(1000))
        });
        let client = client_with(nodes(1), http.clone());

        let summary = client.get_all_balances("bc1qa", None, true).await.unwrap();
        assert!(summary.balances.is_empty());
        assert_eq!(summary.total, 1000);
        assert_eq!(http.calls().len(), 2);
    }

    #[tokio::test]
    async fn uncounted_sweep_stops_at_the_page_cap() {
        let http = ScriptedHttp::new(|url| {
            let page: u64 = query_value(url, "cursor")
                .map(|c| c.parse().unwrap())
                .unwrap_or(0);
            json_page(vec![row("bc1qa", "X", 1, "")], json!(page + 1), None)
        });
        let client = client_with(nodes(1), http.clone());

        let summary = client.get_all_balances("bc1qa", None, false).await.unwrap();
        assert_eq!(http.calls().len() as u64, MAX_SWEEP_PAGES);
        assert_eq!(summary.total, MAX_SWEEP_PAGES);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_grow_linearly() {
        let http = ScriptedHttp::new(|_| Err(HttpError::Network("refused".into())));
        let config = XcpConfig::new(nodes(1)).with_retry_delay(Duration::from_secs(1));
        let client = client_with_config(config, http.clone());

        let started = Instant::now();
        let err = client.get_all_balances("A", None, false).await.unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, XcpError::SweepFailed { attempts: 3, .. }));
        // 1s after the first sweep, 2s after the second, none after the last
        assert!(waited >= Duration::from_secs(3), "waited {waited:?}");
        assert!(waited < Duration::from_secs(4), "waited {waited:?}");
        assert_eq!(http.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn max_retries_bounds_the_sweeps() {
        let http = ScriptedHttp::new(|_| Err(HttpError::Network("refused".into())));
        let config = XcpConfig::new(nodes(1))
            .with_retry_delay(Duration::from_secs(1))
            .with_max_retries(2);
        let client = client_with_config(config, http.clone());

        let started = Instant::now();
        let err = client.get_all_balances("A", None, false).await.unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, XcpError::SweepFailed { attempts: 2, .. }));
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(2));
        assert_eq!(http.calls().len(), 2);
    }

    #[tokio::test]
    async fn path_values_are_encoded_as_single_segments() {
        let http = ScriptedHttp::new(|_| json_page(vec![], Value::Null, Some(0)));
        let client = client_with(nodes(1), http.clone());

        client
            .get_balances("bc1q/../assets", Some("A1?x=1#"), false, &BalanceQuery::default())
            .await
            .unwrap();
        assert_eq!(
            http.last_call().unwrap(),
            "https://node1.test/v2/addresses/bc1q%2F..%2Fassets/balances/A1%3Fx%3D1%23?verbose=true"
        );

        let err = client.get_all_balances("..", None, false).await.unwrap_err();
        assert!(matches!(err, XcpError::InvalidRequest(_)));
        assert_eq!(http.calls().len(), 1);
    }
}
