//! Item lifetime and the generation counter.

use robust_integration_tests::SimNetwork;
use robust_topology::GridCoord;

#[test]
fn test_item_present_for_exactly_energy_ticks() {
    for energy in 1u64..=6 {
        let mut net = SimNetwork::new(3, 24000);
        let origin = GridCoord::new(0, 0);
        net.node_mut(origin).inject("ttl", "", energy).unwrap();

        let mut present = 0;
        while net.node(origin).store().contains("ttl") {
            net.run_round();
            present += 1;
            assert!(present <= energy, "energy {} outlived its budget", energy);
        }
        assert_eq!(present, energy, "energy {}", energy);
        // Echoes from neighbors never bring it back.
        net.run_rounds(3);
        assert!(net.is_quiet());
    }
}

#[test]
fn test_reported_energy_is_always_positive() {
    let mut net = SimNetwork::new(4, 24100);
    net.node_mut(GridCoord::new(1, 2)).inject("a", "", 7).unwrap();
    net.node_mut(GridCoord::new(3, 0)).inject("b", "", 3).unwrap();

    for _ in 0..10 {
        net.run_round();
        for coord in net.grid().coords().collect::<Vec<_>>() {
            let status = net.ping(coord).unwrap();
            assert_eq!(status.information_count, status.information.len());
            for (info_id, summary) in &status.information {
                assert!(summary.energy > 0, "{} at {} has no energy", info_id, coord);
            }
        }
    }
    assert!(net.is_quiet());
}

#[test]
fn test_generation_counts_live_ticks() {
    let mut net = SimNetwork::new(2, 24200);
    net.run_rounds(3);
    let victim = GridCoord::new(1, 1);
    net.kill(victim);
    net.flush();
    net.run_rounds(4);

    assert_eq!(net.node(GridCoord::ORIGIN).generation(), 7);
    assert_eq!(net.node(victim).generation(), 3);

    assert!(net.node_mut(victim).revive());
    net.run_rounds(2);
    assert_eq!(net.node(victim).generation(), 5);
    assert_eq!(net.ping(victim).unwrap().generation, 5);
}
