//! Offline two-player demo over a loopback wire.
//!
//! Runs the whole stack without a network: two sessions exchange real
//! frames through an in-process pipe, demonstrating optimistic placement,
//! turn gating, rollback-free convergence, and removal refunds.

use anyhow::Result;
use gridtown_client::Session;
use gridtown_core::{BuildingKind, GameState, GameStatus, Grid, Player, PlayerId, ResourceKind};
use gridtown_net::{loopback_pair, LoopbackWire};
use tracing::info;

fn seeded_sessions(room: &str) -> (Session<LoopbackWire>, Session<LoopbackWire>) {
    let mut game = GameState::new("demo", room);
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        let mut player = Player::new(PlayerId::new(id), name);
        player.resources.wood = 60;
        player.resources.ore = 20;
        game.add_player(player);
    }
    game.status = GameStatus::Active;
    let grid = Grid::new();

    let (a_wire, b_wire) = loopback_pair();
    (
        Session::new(a_wire, game.clone(), grid.clone(), PlayerId::new("alice")),
        Session::new(b_wire, game, grid, PlayerId::new("bob")),
    )
}

fn wood(session: &Session<LoopbackWire>, id: &str) -> u32 {
    session.game().players[&PlayerId::new(id)]
        .resources
        .get(ResourceKind::Wood)
}

/// Run the scripted demo, printing each step.
pub async fn run(room: &str) -> Result<()> {
    let (mut alice, mut bob) = seeded_sessions(room);

    info!("demo: alice places a road on her turn");
    alice.place_building(5, 5, BuildingKind::Road).await?;
    bob.pump().await?;
    alice.pump().await?;
    println!(
        "alice placed a road at (5, 5): wood {} on both replicas",
        wood(&alice, "alice")
    );
    assert_eq!(wood(&alice, "alice"), wood(&bob, "alice"));

    info!("demo: bob tries to build off turn");
    bob.place_building(10, 10, BuildingKind::LumberYard).await?;
    println!(
        "bob's lumber yard parked off-turn: wood still {}",
        wood(&bob, "bob")
    );

    info!("demo: alice ends her turn, releasing bob's action");
    alice.end_turn().await?;
    bob.pump().await?;
    alice.pump().await?;
    bob.pump().await?; // alice's acceptance settles bob's optimistic apply
    println!(
        "turn passed to bob, parked action applied: bob wood {}",
        wood(&bob, "bob")
    );

    info!("demo: bob removes the lumber yard for a half refund");
    bob.remove_building(10, 10).await?;
    alice.pump().await?;
    bob.pump().await?;
    println!(
        "bob removed the lumber yard: wood {} (half the cost back)",
        wood(&bob, "bob")
    );

    alice.send_chat("good game").await?;
    bob.pump().await?;

    println!("replicas converged; demo complete");
    Ok(())
}
