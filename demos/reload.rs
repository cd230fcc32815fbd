//! Crossbow Reload
//!
//! Walks a crossbow through a branched reload on a manual clock: start,
//! cancel, start again and let the timer finish it.
//!
//! Key concepts:
//! - Item definitions loaded from JSON
//! - Intermediate states synthesized for staged operations
//! - Timers that finish an operation, and inputs that cancel it
//! - Pluggable systems verified before and processed during a transition
//!
//! Run with: RUST_LOG=toolstate=debug cargo run --example reload

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use toolstate::builder::{ItemDefinition, ItemFsmBuilder};
use toolstate::core::{GuardContext, PlayerId, SlotId};
use toolstate::effects::{Engine, ManualClock, System, SystemError, SystemRegistry};
use toolstate::sync::{Inventory, ItemStack};

const CROSSBOW: &str = r#"{
    "code": "crossbow",
    "dimensions": [["idle", "aiming"], ["empty", "loaded"]],
    "initial": "idle-empty",
    "inputs": [
        { "code": "start-reload", "kind": "key_press" },
        { "code": "cancel-reload", "kind": "key_release" }
    ],
    "operations": [{
        "code": "reload",
        "kind": "branched",
        "delay_ms": 1200,
        "states": [{
            "initial": "idle-empty",
            "timeout": "idle-loaded",
            "finals": { "cancel": "idle-empty" },
            "label": "reloading"
        }],
        "stages": {
            "initial": {
                "inputs": ["start-reload"],
                "systems": [{ "system": "sound", "request": { "clip": "crank" } }]
            },
            "cancel": { "inputs": ["cancel-reload"] }
        }
    }]
}"#;

/// Prints every request it processes.
struct Sound;

impl System for Sound {
    fn verify(&self, _ctx: &GuardContext<'_>, request: &Value) -> Result<bool, SystemError> {
        Ok(request.get("clip").is_some())
    }

    fn process(&self, ctx: &GuardContext<'_>, request: &Value) -> Result<bool, SystemError> {
        println!("  [sound] {} for player {:?}", request["clip"], ctx.player);
        Ok(true)
    }
}

fn report(engine: &mut Engine, slot: SlotId, what: &str) {
    println!("{:<28} state = {}", what, engine.state(slot));
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("=== Crossbow Reload Example ===\n");

    let fsm = ItemFsmBuilder::new(ItemDefinition::from_json(CROSSBOW)?)
        .systems(SystemRegistry::new().with("sound", Arc::new(Sound)))
        .build()?;
    println!(
        "Built '{}' with {} states and {} operations\n",
        fsm.item(),
        fsm.resolver().states().len(),
        fsm.operations().len()
    );

    let slot = SlotId(0);
    let player = PlayerId(7);
    let clock = Arc::new(ManualClock::default());
    let mut engine = Engine::builder(fsm)
        .clock(clock.clone())
        .storage(Inventory::new().with(slot, ItemStack::new("crossbow")))
        .build();

    report(&mut engine, slot, "Initial");

    engine.handle_input(slot, player, "start-reload");
    report(&mut engine, slot, "Reload started");

    clock.advance(Duration::from_millis(400));
    engine.handle_input(slot, player, "cancel-reload");
    report(&mut engine, slot, "Cancelled after 400ms");

    engine.handle_input(slot, player, "start-reload");
    clock.advance(Duration::from_millis(1200));
    let fired = engine.tick();
    report(&mut engine, slot, &format!("Timer fired ({fired})"));

    println!("\nPath:");
    for state in engine.history().get_path(slot) {
        println!("  {}", state);
    }

    engine.shutdown();
    println!("\n=== Example Complete ===");
    Ok(())
}
