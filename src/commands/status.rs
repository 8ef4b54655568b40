use anyhow::{Context, Result, bail};
use yds_flow::VaultStore;
use yds_flow::accounting::SharePrice;
use yds_flow::config::RuntimeConfig;
use yds_flow::liveness::{LivenessMonitor, LivenessProbe, LivenessStatus};
use yds_flow::model::amount::DecimalAmount;
use yds_flow::model::operation::LifecycleState;
use yds_flow::model::state::{Loadable, VaultSnapshot};

pub async fn status(store: &VaultStore, json: bool) -> Result<()> {
    store.refresh().await;
    store.probe_liveness().await;
    let snapshot = store.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

/// Keep the view live and print a line per poll until Ctrl-C.
pub async fn watch(store: &VaultStore, config: &RuntimeConfig) -> Result<()> {
    let view = store.activate();
    println!("Watching ({} timers, Ctrl-C to stop)", view.timers());

    let mut ticker = tokio::time::interval(config.timings.poll_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let s = store.snapshot();
                println!(
                    "[{}] assets {}  price {}  profit {}  shares {}  node {}",
                    chrono::Utc::now().format("%H:%M:%S"),
                    show(&s.global.total_assets, 2),
                    show_price(&s.share_price),
                    show(&s.available_profit, 2),
                    show(&s.position.share_balance, 4),
                    liveness_label(&s.liveness),
                );
            }
            _ = &mut shutdown => {
                println!("\nStopping.");
                break;
            }
        }
    }
    drop(view);
    Ok(())
}

pub async fn probe(rpc_url: &str, chain_id: u64) -> Result<()> {
    let probe = LivenessProbe::new(rpc_url)?;
    let monitor = LivenessMonitor::new(chain_id, 1);
    let status = monitor.record(probe.chain_id().await);
    println!("{rpc_url}: {}", liveness_label(&status));
    match status {
        LivenessStatus::Running => Ok(()),
        LivenessStatus::WrongChain { chain_id: found } => {
            bail!("node reports chain {found}, expected {chain_id}")
        }
        LivenessStatus::Unreachable | LivenessStatus::Checking => bail!("node not reachable at {rpc_url}"),
    }
}

pub async fn network(store: &VaultStore) -> Result<()> {
    let net = store.network();
    net.poll_wallet().await?;
    let state = net.state();
    println!(
        "Wallet chain: {}",
        state.current_chain_id.map(|c| c.to_string()).unwrap_or_else(|| "unknown".into())
    );
    println!("Target chain: {}", state.target_chain_id);

    if state.is_correct_network() {
        println!("Network OK.");
        return Ok(());
    }
    println!("Wrong network, requesting switch...");
    store
        .switch_to_local()
        .await
        .context("network switch failed (a bare node rejects it; see --wallet-rpc-url)")?;
    println!("Switched to chain {}.", net.target());
    Ok(())
}

// ── Formatting ───────────────────────────────────────────────────────

pub fn show(value: &Loadable<DecimalAmount>, digits: u8) -> String {
    match value {
        Loadable::Loaded(v) => v.format_fixed(digits),
        Loadable::NotYetLoaded => "loading".into(),
    }
}

fn show_price(price: &Loadable<SharePrice>) -> String {
    match price {
        Loadable::Loaded(p @ SharePrice::Derived(_)) => p.value().to_string(),
        Loadable::Loaded(p @ SharePrice::NoDeposits) => format!("{} (no deposits yet)", p.value()),
        Loadable::Loaded(p @ SharePrice::OutOfRange) => format!("{} (reported ratio out of range)", p.value()),
        Loadable::NotYetLoaded => "loading".into(),
    }
}

fn liveness_label(status: &LivenessStatus) -> String {
    match status {
        LivenessStatus::Checking => "checking".into(),
        LivenessStatus::Running => "running".into(),
        LivenessStatus::WrongChain { chain_id } => format!("wrong chain ({chain_id})"),
        LivenessStatus::Unreachable => "not connected".into(),
    }
}

pub fn print_snapshot(s: &VaultSnapshot) {
    println!("── Vault ──");
    println!("  Total assets:  {} USDC", show(&s.global.total_assets, 2));
    println!("  Total supply:  {} shares", show(&s.global.total_supply, 4));
    println!("  Share price:   {}", show_price(&s.share_price));
    println!("  Watermark:     {} USDC", show(&s.global.watermark, 2));
    println!("  Profit:        {} USDC", show(&s.available_profit, 2));

    println!("── Position ──");
    println!("  USDC:          {}", show(&s.position.asset_balance, 2));
    println!("  Shares:        {}", show(&s.position.share_balance, 4));
    println!("  Allowance:     {}", show(&s.position.allowance, 2));
    println!("  Max withdraw:  {} USDC", show(&s.position_value, 2));
    if let (Loadable::Loaded(value), Loadable::Loaded(total)) = (&s.position_value, &s.global.total_assets) {
        if !total.is_zero() {
            println!("  Vault share:   {:.2}%", value.to_f64() / total.to_f64() * 100.0);
        }
    }

    println!("── Donations ──");
    match &s.donations {
        Loadable::Loaded(d) => {
            println!("  Total donated: {} USDC", d.total_donated.format_fixed(2));
            for r in &d.recipients {
                println!(
                    "  {:<16} {}  {:>5.1}%  received {}  next harvest {}",
                    r.name,
                    r.address,
                    f64::from(r.bps) / 100.0,
                    r.received.format_fixed(2),
                    r.pending_share.format_fixed(2),
                );
            }
        }
        Loadable::NotYetLoaded => println!("  loading"),
    }

    println!("── Network ──");
    println!(
        "  Wallet chain:  {} (target {}{})",
        s.network.current_chain_id.map(|c| c.to_string()).unwrap_or_else(|| "unknown".into()),
        s.network.target_chain_id,
        if s.network.is_switching { ", switching" } else { "" },
    );
    println!("  Node:          {}", liveness_label(&s.liveness));

    let active: Vec<_> = s
        .operations
        .iter()
        .filter(|op| op.state != LifecycleState::Idle)
        .collect();
    if !active.is_empty() {
        println!("── Operations ──");
        for op in active {
            println!(
                "  {:<14} {:?}{}",
                op.kind,
                op.state,
                op.failure.as_deref().map(|f| format!(": {f}")).unwrap_or_default(),
            );
        }
    }
}
