//! riskgate - demo binary
//!
//! Wires an engine to a file-backed store and drives it with a stream of
//! simulated proposals so the admission pipeline, breaker transitions, and
//! alerts can be watched live.

use std::path::Path;
use std::sync::Arc;

use rand::RngExt;
use rust_decimal::Decimal;
use riskgate::{
    AccountRegistry, AdmissionDecision, AlertSeverity, JsonFileStore, RiskEvent, RiskPolicy,
    SystemClock, TradeOutcome, TradeRequest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("riskgate starting");

    let policy_path = Path::new("riskgate.toml");
    let policy = if policy_path.exists() {
        RiskPolicy::load(policy_path)?
    } else {
        RiskPolicy::default()
    };

    let store = Arc::new(JsonFileStore::new("./riskgate-data"));
    let (events_tx, events_rx) = flume::unbounded();
    let registry = AccountRegistry::new(store, Arc::new(SystemClock), policy, events_tx)?;

    // Drain engine events into the log, the way a dashboard would.
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv_async().await {
            match event {
                RiskEvent::Alert { message, severity } => match severity {
                    AlertSeverity::Critical | AlertSeverity::High => {
                        tracing::warn!(%severity, "{message}")
                    }
                    _ => tracing::info!(%severity, "{message}"),
                },
                RiskEvent::Paused { reason } => tracing::warn!(%reason, "paused"),
                RiskEvent::EmergencyStopped { reason } => {
                    tracing::error!(%reason, "emergency stop")
                }
                RiskEvent::Resumed => tracing::info!("resumed"),
                RiskEvent::EmergencyReset => tracing::info!("emergency stop reset"),
                RiskEvent::DayRolled => tracing::info!("new trading day"),
                RiskEvent::StateChanged { .. } => {}
            }
        }
    });

    let engine = registry.open("demo").await?;

    let mut rng = rand::rng();
    let mut portfolio = 10_000.0_f64;

    for round in 1..=20 {
        let size = rng.random_range(100.0..2_500.0);
        let mut request = TradeRequest::new(
            Decimal::try_from(size).unwrap_or_default(),
            Decimal::try_from(portfolio).unwrap_or_default(),
        );
        if rng.random_bool(0.3) {
            request = request.with_price_impact(
                Decimal::try_from(rng.random_range(0.5..12.0)).unwrap_or_default(),
            );
        }

        let decision = engine.lock().check_trade(&request);
        match &decision {
            AdmissionDecision::Allowed {
                size_usd,
                warnings,
                requires_confirmation,
                ..
            } => {
                tracing::info!(
                    round,
                    requested = %request.size_usd,
                    approved = %size_usd,
                    confirm = requires_confirmation,
                    ?warnings,
                    "trade admitted"
                );

                // simulate the fill and its outcome
                let is_win = rng.random_bool(0.45);
                let pnl = size * rng.random_range(0.01..0.08) * if is_win { 1.0 } else { -1.0 };
                portfolio += pnl;
                let outcome = TradeOutcome {
                    pnl: Decimal::try_from(pnl).unwrap_or_default(),
                    volume: *size_usd,
                    is_win,
                };
                let mut engine = engine.lock();
                engine.record_trade(&outcome);
                engine.update_portfolio_value(Decimal::try_from(portfolio).unwrap_or_default());
            }
            AdmissionDecision::Denied { reason, .. } => {
                tracing::info!(round, %reason, "trade denied");
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    let status = engine.lock().risk_status();
    tracing::info!(
        healthy = status.healthy,
        daily_pnl = %status.daily_pnl,
        drawdown = %status.current_drawdown,
        streak = status.consecutive_losses,
        advisories = ?status.advisories,
        "session summary"
    );

    Ok(())
}
