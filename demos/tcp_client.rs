//! TCP Client State Machine
//!
//! This example models a client connection with a simulated network.
//!
//! Key concepts:
//! - Actions with pending, resolved and rejected states
//! - Hooks that retry and veto
//! - A nested session scope tied to the Connected state
//! - Observing transition events
//!
//! Run with: cargo run --example tcp_client

use serde_json::{json, Value};
use statehook::{
    ActionBuilder, ActionError, Hook, MachineEvent, Phase, StateBuilder, StateMachine, Verdict,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Pretends to be the network. Every other dial fails.
struct Network {
    dials: AtomicU32,
}

impl Network {
    async fn dial(&self, host: &str) -> Result<Value, ActionError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let dial = self.dials.fetch_add(1, Ordering::SeqCst);
        if dial % 2 == 1 {
            return Err(ActionError::new(format!("connection to {host} refused")));
        }
        Ok(json!({ "host": host, "socket": dial }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    println!("=== TCP Client State Machine ===\n");

    let session = StateMachine::builder()
        .name("session")
        .state(StateBuilder::new("Handshake", 0).initial().next(["Ready"]))
        .state(StateBuilder::new("Ready", 1).next(["Handshake"]));

    let machine = StateMachine::builder()
        .name("tcp-client")
        .history(8)
        .autostart(false)
        .context(Arc::new(Network {
            dials: AtomicU32::new(0),
        }))
        .state(
            StateBuilder::new("Disconnected", 0)
                .initial()
                .next(["Connecting", "Closed"]),
        )
        .state(
            StateBuilder::new("Connecting", 1)
                .title("Dialing")
                .next(["Connected", "Disconnected"])
                .on_enter(Hook::from_fn(|args| {
                    // Give the socket layer a moment on the first attempt.
                    if args.attempt() == 0 {
                        return args.retry(Duration::from_millis(10));
                    }
                    Ok(Verdict::Continue)
                })),
        )
        .state(
            StateBuilder::new("Connected", 2)
                .next(["Disconnected", "Closed"])
                .scope(session),
        )
        .state(StateBuilder::new("Closed", 3).final_state())
        .action(
            ActionBuilder::new("connect")
                .when(["Disconnected"])
                .pending("Connecting")
                .resolved("Connected")
                .rejected("Disconnected")
                .timeout(Duration::from_secs(1))
                .execute(|call| async move {
                    let host = call
                        .arg(0)
                        .and_then(Value::as_str)
                        .unwrap_or("localhost")
                        .to_string();
                    let network = call
                        .context::<Network>()
                        .ok_or_else(|| ActionError::new("no network"))?;
                    network.dial(&host).await
                }),
        )
        .action(
            ActionBuilder::new("disconnect")
                .when(["Connected"])
                .finally("Disconnected")
                .execute(|_| async { Ok(Value::Null) }),
        )
        .on_transition_end(|event| {
            println!("  {} -> {} in {:?}", event.from, event.to, event.elapsed.unwrap_or_default());
        })
        .build()?;

    machine.observe(|event| {
        if let MachineEvent::Error { error } = event {
            println!("  forced into ERROR: {error}");
        }
    });
    machine.on(
        "Connected",
        Phase::Leave,
        Hook::from_fn(|args| {
            println!("  closing socket ({} requested)", args.to());
            Ok(Verdict::Continue)
        }),
    );

    machine.start().await?;
    println!("Started in {}\n", machine.current().name());

    for round in 1..=3 {
        println!("Round {round}: connect");
        match machine.execute("connect", vec![json!("example.org")]).await {
            Ok(socket) => {
                println!("  connected: {socket}");
                let session = machine.scope("Connected").ok_or("missing session scope")?;
                session.transition("Ready", Value::Null).await?;
                println!("  session is {}", session.current().name());

                let pending = machine.invoke("disconnect", vec![])?;
                pending.wait().await?;
            }
            Err(err) => println!("  {err}"),
        }
        println!("  now {}\n", machine.current().name());
    }

    machine.transition("Closed", Value::Null).await?;
    println!("Final state: {}", machine.current().name());
    println!("History: {:?}", machine.history().path());

    println!("\n=== Example Complete ===");
    Ok(())
}
