use anyhow::Result;

use calori_core::advice::{AdviceTopic, TextGenerator};
use calori_core::service::Tracker;

pub(crate) async fn cmd_advice(
    tracker: &Tracker,
    generator: Option<&dyn TextGenerator>,
    topic: &str,
    json: bool,
) -> Result<()> {
    let parsed: AdviceTopic = topic.parse()?;
    let Some(text) = tracker.advice(generator, parsed).await? else {
        if json {
            println!("{}", serde_json::json!({ "topic": topic, "advice": null }));
        } else {
            eprintln!("Nothing to analyze yet. Log some {topic} data first.");
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::json!({ "topic": topic, "advice": text }));
    } else {
        println!("{text}");
    }
    Ok(())
}
