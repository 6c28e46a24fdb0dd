//! Server-rendered HTML for the dashboard and service card.

use std::fmt::Write;

use crate::analytics::AnalyticsSummary;
use crate::state::{MetricsSnapshot, RuntimeTunables, ServiceInfo};

const STYLE: &str = "body{font-family:system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial,sans-serif;margin:24px}\
.card{max-width:860px;margin:0 auto 16px;padding:16px 20px;border:1px solid #e5e7eb;border-radius:12px}\
.ok{color:#16a34a}.warn{color:#ef4444}\
code{background:#f3f4f6;padding:2px 4px;border-radius:6px}\
table{border-collapse:collapse;width:100%}td,th{padding:4px 8px;border-bottom:1px solid #e5e7eb;text-align:left}\
label{display:block;margin:6px 0}input{margin-left:8px}";

/// Minimal HTML escaping for text and attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset='utf-8'/>\
<meta name='viewport' content='width=device-width, initial-scale=1'/>\
<title>{}</title><style>{STYLE}</style></head><body>{body}</body></html>",
        escape(title)
    )
}

fn service_card(service: &ServiceInfo) -> String {
    let wallet = if service.wallet_configured {
        "<span class='ok'>yes</span>"
    } else {
        "<span class='warn'>no</span>"
    };
    format!(
        "<div class='card'><h1>Service running</h1>\
<ul><li>Mode: <code>{}</code> / strategy <code>{}</code></li>\
<li>RPC: <code>{}</code></li><li>WS: <code>{}</code></li>\
<li>Watching: <code>{}</code></li>\
<li>Wallet configured: {wallet}</li></ul>\
<p>Endpoints: <code>/status</code>, <code>/health</code>, <code>/analytics</code>, \
<code>/config</code>, <code>/metrics</code>, <code>/service</code></p></div>",
        escape(&service.mode),
        escape(&service.strategy),
        escape(&service.rpc_url),
        escape(&service.ws_url),
        escape(&service.watch_program_ids.join(", ")),
    )
}

/// Standalone service card.
pub fn render_service_page(service: &ServiceInfo) -> String {
    document("Membot Service", &service_card(service))
}

/// Main dashboard: status, metrics, recent trades and the tunables form.
pub fn render_dashboard(
    service: &ServiceInfo,
    summary: &AnalyticsSummary,
    tunables: &RuntimeTunables,
    metrics: &MetricsSnapshot,
    trading_enabled: bool,
) -> String {
    let mut body = service_card(service);

    let trading = if trading_enabled {
        "<span class='ok'>enabled</span>"
    } else {
        "<span class='warn'>paused</span>"
    };
    let _ = write!(
        body,
        "<div class='card'><h2>Activity</h2><p>Trading: {trading}</p>\
<table><tr><th>Candidates</th><th>Rejected</th><th>Buys</th><th>Sells</th><th>Failed sells</th><th>Accounts closed</th></tr>\
<tr><td>{}</td><td>{}</td><td>{}/{}</td><td>{}</td><td>{}</td><td>{}</td></tr></table></div>",
        metrics.candidates_seen,
        metrics.candidates_rejected,
        metrics.buys_succeeded,
        metrics.buys_attempted,
        metrics.sells_succeeded,
        metrics.sells_failed,
        metrics.atas_closed,
    );

    let _ = write!(
        body,
        "<div class='card'><h2>Analytics</h2><p>Total trades: {} | Profit: ${}</p>\
<table><tr><th>Time</th><th>Mint</th><th>Action</th><th>Amount</th><th>Price</th></tr>",
        summary.total_trades,
        summary.profit.round_dp(4),
    );
    for trade in &summary.trades {
        let _ = write!(
            body,
            "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td></tr>",
            trade.timestamp.format("%H:%M:%S"),
            escape(&trade.mint),
            trade.side,
            trade.amount.round_dp(4),
            trade.price.round_dp(10),
        );
    }
    body.push_str("</table></div>");

    let _ = write!(
        body,
        "<div class='card'><h2>Tunables</h2><form method='post' action='/config'>\
<label>Hold time (s)<input name='SCALP_HOLD_SEC' value='{}'/></label>\
<label>Buy slippage (bps)<input name='SLIPPAGE_BPS_BUY' value='{}'/></label>\
<label>Sell slippage (bps)<input name='SLIPPAGE_BPS_SELL' value='{}'/></label>\
<label>Stop loss (mcap USD)<input name='MCAP_STOP_LOSS' value='{}'/></label>\
<button type='submit'>Update</button></form></div>",
        tunables.hold_time_secs,
        tunables.slippage_buy_bps,
        tunables.slippage_sell_bps,
        tunables.stop_loss_usd,
    );

    document("Membot Dashboard", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::TradeAnalytics;
    use crate::config::BotConfig;
    use membot_common::TradeSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_service_page_reports_wallet() {
        let config = BotConfig::default();
        let info = ServiceInfo::from_config(&config);
        let html = render_service_page(&info);
        assert!(html.contains("Wallet configured: <span class='warn'>no</span>"));
        assert!(html.contains(&config.network.rpc_url));
    }

    #[test]
    fn test_dashboard_lists_trades_and_form() {
        let config = BotConfig::default();
        let analytics = TradeAnalytics::new();
        analytics.record("MintAAA", TradeSide::Buy, dec!(1000), dec!(0.01));

        let html = render_dashboard(
            &ServiceInfo::from_config(&config),
            &analytics.summary(),
            &RuntimeTunables::from_config(&config),
            &Default::default(),
            true,
        );
        assert!(html.contains("<code>MintAAA</code>"));
        assert!(html.contains("name='SLIPPAGE_BPS_BUY' value='9000'"));
        assert!(html.contains("Total trades: 1"));
    }
}
