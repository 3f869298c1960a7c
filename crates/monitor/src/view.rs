//! Terminal rendering of the reconciled state

use pbft_consensus_view::ReconciledState;
use pbft_trade_types::{timefmt::HISTORY_TIME_FORMAT, ConsensusResult, TradeRecord};

fn result_line(result: &ConsensusResult) -> String {
    let tally = result.tally();
    let mut line = format!(
        "tx {} {:?} (commit {}, precommit {}, reject {}; seq {})",
        result.tx_id, result.status, tally.commit, tally.precommit, tally.reject, result.sequence
    );
    if let Some(reason) = &result.failed_reason {
        line.push_str(&format!(": {}", reason));
    }
    line
}

/// One line per published change
pub fn summary(state: &ReconciledState) -> String {
    let mut parts = Vec::new();

    parts.push(match &state.result {
        Some(result) => result_line(result),
        None => "no consensus result".to_string(),
    });
    parts.push(match &state.block {
        Some(block) => format!("block #{} ({} txs)", block.height, block.confirmed_count),
        None => "no block".to_string(),
    });
    if let Some(balance) = state.balance {
        parts.push(format!("balance {:.2}", balance));
    }
    parts.push(format!("{} history records", state.history.len()));

    let mut line = parts.join(" | ");

    let stale: Vec<&str> = [
        ("balance", state.stale.balance),
        ("history", state.stale.history),
        ("consensus", state.stale.consensus),
    ]
    .iter()
    .filter(|(_, stale)| *stale)
    .map(|(name, _)| *name)
    .collect();
    if !stale.is_empty() {
        line.push_str(&format!(" [stale: {}]", stale.join(", ")));
    }
    if state.auth_required {
        line.push_str(" [login required]");
    }
    line
}

pub fn history_row(record: &TradeRecord) -> String {
    format!(
        "{}  {:<7} {:>10.2}  {:>8}  {:<10} {:?}",
        record.time.format(HISTORY_TIME_FORMAT),
        record.trade_type.as_str(),
        record.amount,
        record
            .price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string()),
        record.node.as_deref().unwrap_or("-"),
        record.status
    )
}
