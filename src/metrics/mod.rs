//! Metric names and registration
//!
//! All metric names live here so dashboards and code stay in sync. The
//! Prometheus recorder is installed in `main` and rendered on `/metrics`.

pub const MATCHING_SWEEPS_TOTAL: &str = "matching_sweeps_total";
pub const MATCHING_TRADES_TOTAL: &str = "matching_trades_total";
pub const MATCHING_CONFLICTS_TOTAL: &str = "matching_conflicts_total";
pub const MATCHING_STALLED: &str = "matching_stalled_pairs";
pub const STREAM_OFFSET: &str = "event_stream_offset";
pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
pub const WS_SUBSCRIBERS: &str = "ws_subscribers";
pub const WS_SUBSCRIBERS_LAGGED_TOTAL: &str = "ws_subscribers_lagged_total";
pub const LEDGER_SUBMITS_TOTAL: &str = "ledger_submits_total";

pub fn describe() {
    metrics::describe_counter!(
        MATCHING_SWEEPS_TOTAL,
        "Matching sweeps executed, labelled by pair"
    );
    metrics::describe_counter!(
        MATCHING_TRADES_TOTAL,
        "Trades settled by the matching engine, labelled by pair"
    );
    metrics::describe_counter!(
        MATCHING_CONFLICTS_TOTAL,
        "Match submissions lost to book contention, labelled by pair"
    );
    metrics::describe_gauge!(
        MATCHING_STALLED,
        "1 while a pair has crossed-but-unmatched orders beyond the stall threshold"
    );
    metrics::describe_gauge!(STREAM_OFFSET, "Last ledger offset ingested by the fan-out");
    metrics::describe_counter!(EVENTS_PUBLISHED_TOTAL, "Events published to subscribers");
    metrics::describe_gauge!(WS_SUBSCRIBERS, "Currently connected fan-out subscribers");
    metrics::describe_counter!(
        WS_SUBSCRIBERS_LAGGED_TOTAL,
        "Subscribers dropped for exceeding their event buffer"
    );
    metrics::describe_counter!(LEDGER_SUBMITS_TOTAL, "Ledger command submissions, labelled by outcome");
}
