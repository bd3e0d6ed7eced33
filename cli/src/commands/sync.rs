use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calori_core::reconcile::TypeOutcome;
use calori_core::service::Tracker;

use super::helpers::print_json;

/// Push queued writes after a local change. Remote failures only leave a note.
pub(crate) async fn push_pending(tracker: &Tracker) -> Result<()> {
    if let Some(summary) = tracker.flush_sync_queue().await? {
        if summary.remaining > 0 {
            eprintln!(
                "Note: {} change(s) waiting to sync. Run `calori sync` to retry.",
                summary.remaining
            );
        }
    }
    Ok(())
}

pub(crate) async fn cmd_sync(tracker: &mut Tracker, push_only: bool, json: bool) -> Result<()> {
    if !tracker.has_remote() {
        bail!("Remote sync is not configured. Set supabase_url and supabase_anon_key");
    }
    tracker.require_user()?;

    if push_only {
        let summary = tracker.flush_sync_queue().await?.unwrap_or_default();
        if json {
            return print_json(&summary);
        }
        println!(
            "Pushed {} change(s), {} failed, {} still queued",
            summary.pushed, summary.failed, summary.remaining
        );
        return Ok(());
    }

    let report = tracker.sync().await?;
    if json {
        return print_json(&report);
    }

    #[derive(Tabled)]
    struct TypeRow {
        #[tabled(rename = "Type")]
        name: String,
        #[tabled(rename = "Local")]
        local: String,
        #[tabled(rename = "Remote")]
        remote: String,
        #[tabled(rename = "Merged")]
        merged: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let rows: Vec<TypeRow> = report
        .reconcile
        .types
        .iter()
        .map(|t| match &t.outcome {
            TypeOutcome::Merged {
                local,
                remote,
                merged,
            } => TypeRow {
                name: t.name.clone(),
                local: local.to_string(),
                remote: remote.to_string(),
                merged: merged.to_string(),
                status: "ok".to_string(),
            },
            TypeOutcome::Failed { error } => TypeRow {
                name: t.name.clone(),
                local: "-".to_string(),
                remote: "-".to_string(),
                merged: "-".to_string(),
                status: format!("kept local ({error})"),
            },
        })
        .collect();

    println!(
        "Pushed {} change(s), {} still queued\n",
        report.flush.pushed, report.flush.remaining
    );
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_clear(tracker: &mut Tracker, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("This deletes all activity stored on this device. Re-run with --yes to confirm");
    }
    tracker.clear_activity()?;
    if json {
        println!("{}", serde_json::json!({ "cleared": true }));
    } else {
        println!("Cleared all local activity data");
    }
    Ok(())
}
