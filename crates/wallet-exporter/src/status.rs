//! Plain-text dump of the current snapshot for `/status`.

use crate::{
    model::{
        EntityKind,
        EntityRecord,
        to_display_units,
    },
    snapshot::Snapshot,
};
use chrono::{
    DateTime,
    SecondsFormat,
    Utc,
};
use std::fmt::{
    self,
    Write,
};

pub fn render_status(network: &str, snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    // writes into a String are infallible
    let _ = write_status(&mut out, network, snapshot, now);
    out
}

fn write_status(
    out: &mut String,
    network: &str,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> fmt::Result {
    writeln!(out, "Dealbot Wallet Exporter Status")?;
    writeln!(out, "==============================")?;
    writeln!(out)?;
    writeln!(out, "Network: {network}")?;
    writeln!(out, "Wallets monitored: {}", snapshot.len())?;
    match snapshot.captured_at() {
        Some(at) => {
            let since = (now - at).num_seconds().max(0);
            writeln!(
                out,
                "Last scrape: {}",
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
            writeln!(out, "Time since last scrape: {since}s")?;
        }
        None => {
            writeln!(out, "Last scrape: never")?;
            writeln!(out, "Time since last scrape: never")?;
        }
    }
    writeln!(out)?;

    let providers: Vec<_> = snapshot.of_kind(EntityKind::Provider).collect();
    let clients: Vec<_> = snapshot.of_kind(EntityKind::Client).collect();
    let others: Vec<_> = snapshot
        .records()
        .iter()
        .filter(|r| matches!(r.kind, EntityKind::Operator | EntityKind::Other))
        .collect();

    if !providers.is_empty() {
        writeln!(out, "Storage Providers ({}):", providers.len())?;
        for record in providers {
            let (id, active) = record
                .provider
                .map(|facts| (facts.id, facts.is_active))
                .unwrap_or_default();
            writeln!(out, "  - ID: {id}, Name: {}", record.name)?;
            write_balances(out, record)?;
            writeln!(out, "    Active: {active}")?;
            writeln!(out)?;
        }
    }

    if !clients.is_empty() {
        writeln!(out, "Client Wallets ({}):", clients.len())?;
        for record in clients {
            writeln!(out, "  - Name: {}", record.name)?;
            write_balances(out, record)?;
            writeln!(out)?;
        }
    }

    if !others.is_empty() {
        writeln!(out, "Other Wallets ({}):", others.len())?;
        for record in others {
            writeln!(out, "  - Name: {} (Type: {})", record.name, record.kind)?;
            write_balances(out, record)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

fn write_balances(out: &mut String, record: &EntityRecord) -> fmt::Result {
    writeln!(out, "    Address: {}", record.address)?;
    writeln!(
        out,
        "    FIL Balance: {:.6} FIL",
        to_display_units(record.native_balance)
    )?;
    writeln!(
        out,
        "    USDFC Balance: {:.6} USDFC",
        to_display_units(record.token_balance)
    )
}
