//! End-to-end two-client scenario over a loopback wire.
//!
//! Exercises the full stack: local validation, turn gating, optimistic
//! application, broadcast, remote replay, acknowledgement, and rollback,
//! with the real codec in the middle.

use gridtown_client::Session;
use gridtown_core::{
    BuildingKind, GameState, GameStatus, Grid, Player, PlayerId, TileKind,
};
use gridtown_net::{loopback_pair, LoopbackWire};

fn two_player_sessions() -> (Session<LoopbackWire>, Session<LoopbackWire>) {
    let mut game = GameState::new("game-1", "ROOM42");
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        let mut player = Player::new(PlayerId::new(id), name);
        player.resources.wood = 30;
        player.resources.ore = 10;
        game.add_player(player);
    }
    game.status = GameStatus::Active;
    let grid = Grid::with_size(12);

    let (a_wire, b_wire) = loopback_pair();
    (
        Session::new(a_wire, game.clone(), grid.clone(), PlayerId::new("alice")),
        Session::new(b_wire, game, grid, PlayerId::new("bob")),
    )
}

#[tokio::test]
async fn on_turn_placement_propagates_and_settles() {
    let (mut alice, mut bob) = two_player_sessions();

    // alice holds the first turn; her road applies at once
    alice.place_building(5, 5, BuildingKind::Road).await.unwrap();
    assert_eq!(alice.grid().get(5, 5).unwrap().tile, TileKind::Road);
    assert_eq!(
        alice.game().players[&PlayerId::new("alice")].resources.wood,
        26
    );

    // bob replays the broadcast and converges
    bob.pump().await.unwrap();
    assert_eq!(bob.grid().get(5, 5).unwrap().tile, TileKind::Road);
    assert_eq!(
        bob.game().players[&PlayerId::new("alice")].resources.wood,
        26
    );

    // bob's acceptance settles alice's optimistic apply
    alice.pump().await.unwrap();
}

#[tokio::test]
async fn off_turn_placement_parks_until_the_turn_arrives() {
    let (mut alice, mut bob) = two_player_sessions();

    // off turn: bob's action parks, nothing is charged or placed
    bob.place_building(7, 7, BuildingKind::Road).await.unwrap();
    assert_eq!(bob.grid().get(7, 7).unwrap().tile, TileKind::Grass);
    assert_eq!(bob.game().players[&PlayerId::new("bob")].resources.wood, 30);

    // alice yields; the turn change releases bob's parked action
    alice.end_turn().await.unwrap();
    bob.pump().await.unwrap();

    assert_eq!(bob.grid().get(7, 7).unwrap().tile, TileKind::Road);
    assert_eq!(bob.game().players[&PlayerId::new("bob")].resources.wood, 26);

    // and alice converges on bob's released placement
    alice.pump().await.unwrap();
    assert_eq!(alice.grid().get(7, 7).unwrap().tile, TileKind::Road);
}

#[tokio::test]
async fn occupied_cell_is_refused_for_the_second_claim() {
    let (mut alice, mut bob) = two_player_sessions();

    alice.place_building(4, 4, BuildingKind::Road).await.unwrap();
    bob.pump().await.unwrap();
    alice.pump().await.unwrap();

    alice.end_turn().await.unwrap();
    bob.pump().await.unwrap();

    // bob now holds the turn but the cell is taken
    let err = bob.place_building(4, 4, BuildingKind::Road).await;
    assert!(err.is_err());
    assert_eq!(bob.game().players[&PlayerId::new("bob")].resources.wood, 30);
}

#[tokio::test]
async fn removal_refunds_half_on_both_sides() {
    let (mut alice, mut bob) = two_player_sessions();

    alice.place_building(2, 2, BuildingKind::LumberYard).await.unwrap();
    bob.pump().await.unwrap();
    alice.pump().await.unwrap();
    // lumber yard costs wood 10; alice sits at 20

    alice.remove_building(2, 2).await.unwrap();
    bob.pump().await.unwrap();
    alice.pump().await.unwrap();

    for session in [&alice, &bob] {
        assert_eq!(session.grid().get(2, 2).unwrap().tile, TileKind::Grass);
        assert_eq!(
            session.game().players[&PlayerId::new("alice")].resources.wood,
            25
        );
    }
}

#[tokio::test]
async fn peer_rejection_rolls_the_optimist_back() {
    // construct divergent replicas: bob's grid has water where alice sees
    // grass, so her optimistic road fails replay on his side
    let mut game = GameState::new("game-1", "ROOM42");
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        let mut player = Player::new(PlayerId::new(id), name);
        player.resources.wood = 30;
        player.resources.ore = 10;
        game.add_player(player);
    }
    game.status = GameStatus::Active;

    let alice_grid = Grid::with_size(12);
    let mut bob_grid = Grid::with_size(12);
    bob_grid.get_mut(6, 6).unwrap().tile = TileKind::Water;

    let (a_wire, b_wire) = loopback_pair();
    let mut alice = Session::new(a_wire, game.clone(), alice_grid, PlayerId::new("alice"));
    let mut bob = Session::new(b_wire, game, bob_grid, PlayerId::new("bob"));

    alice.place_building(6, 6, BuildingKind::Road).await.unwrap();
    assert_eq!(alice.grid().get(6, 6).unwrap().tile, TileKind::Road);
    assert_eq!(
        alice.game().players[&PlayerId::new("alice")].resources.wood,
        26
    );

    // bob refuses the replay; his rejection undoes alice's apply
    bob.pump().await.unwrap();
    alice.pump().await.unwrap();

    assert_eq!(alice.grid().get(6, 6).unwrap().tile, TileKind::Grass);
    assert_eq!(
        alice.game().players[&PlayerId::new("alice")].resources.wood,
        30
    );
}
