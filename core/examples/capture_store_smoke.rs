//! Exercises C9 end to end against a throwaway SQLite file: save a capture,
//! attach discovered actions and an LLM interaction, generate a test file
//! record, then read everything back through the store's own query methods.

use tod_core::discovery::{ActionKind, DiscoveredAction, Priority};
use tod_core::store::{CaptureStore, NewCapture};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CaptureStore::connect(&dir.path().join("smoke.db")).await?;

    let capture = store
        .save_capture(NewCapture {
            url: "https://example.com/signup",
            title: "Sign up",
            html_file: ".tod/captures/1.html",
            html_length: 4096,
            debug_port: 9222,
            ws_target_url: "ws://127.0.0.1:9222/devtools/page/1",
        })
        .await?;
    println!("saved capture id={}", capture.id);

    let capture_id = capture.id.to_string();

    let mut email_step = DiscoveredAction::pending(&capture_id, "Enter your email address".into(), Priority::High);
    email_step.selector = "#email".into();
    email_step.action_kind = ActionKind::Type;
    email_step.user_input = Some("person@example.com".into());

    let mut submit_step = DiscoveredAction::pending(&capture_id, "Submit the sign up form".into(), Priority::Medium);
    submit_step.selector = "button[type=submit]".into();
    submit_step.action_kind = ActionKind::Click;

    store.save_actions(&[email_step.clone(), submit_step.clone()]).await?;
    println!("saved 2 discovered actions");

    store
        .save_interaction(
            Some(&capture_id),
            "action_discovery",
            "openai",
            "gpt-4o",
            "list the actions a user could take on this page",
            "Enter your email address | high\nSubmit the sign up form | medium",
            512,
            48,
            0.0021,
            None,
        )
        .await?;
    println!("saved 1 llm interaction");

    store
        .save_generation(
            &capture_id,
            &[email_step.id.clone(), submit_step.id.clone()],
            "playwright",
            "tests/e2e/sign-up.spec.ts",
            "// generated playwright test body",
        )
        .await?;
    println!("saved 1 test generation");

    let recent = store.list_recent_captures(5).await?;
    println!("list_recent_captures returned {} row(s)", recent.len());

    let actions = store.list_actions(&capture_id).await?;
    println!("list_actions returned {} row(s), first priority={}", actions.len(), actions[0].priority);

    let interactions = store.list_interactions(&capture_id).await?;
    let generations = store.list_generations(&capture_id).await?;
    println!(
        "list_interactions={} list_generations={}",
        interactions.len(),
        generations.len()
    );

    let stats = store.statistics().await?;
    println!(
        "statistics: captures={} actions={} interactions={} generations={} cost_usd={:.4}",
        stats.capture_count, stats.action_count, stats.interaction_count, stats.generation_count, stats.total_cost_usd
    );

    store.delete_capture(capture.id).await?;
    let after_delete = store.list_actions(&capture_id).await?;
    assert!(after_delete.is_empty());
    println!("delete_capture cascaded as expected");

    Ok(())
}
