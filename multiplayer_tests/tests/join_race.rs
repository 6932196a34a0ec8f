// Property test: concurrent joins converge on one roster.
//
// B and C start joining the same room before either is admitted. The three
// sessions are then polled in an arbitrary order (drawn by proptest), which
// steers how the host's replies and broadcasts interleave with the second
// join. Whatever the interleaving, once the network goes quiet all three
// must agree on `[H, B, C]` or `[H, C, B]`, and each client's last reported
// snapshot must match what it holds.

use multiplayer_tests::{TestNet, names};
use proptest::prelude::*;

const CODE: &str = "R4CE5";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn concurrent_joins_converge(
        b_first in any::<bool>(),
        schedule in prop::collection::vec(0usize..3, 0..40),
    ) {
        let net = TestNet::new();
        let mut host = net.host("H", CODE);
        let mut b = net.peer("B");
        let mut c = net.peer("C");
        if b_first {
            net.join(&mut b, CODE).unwrap();
            net.join(&mut c, CODE).unwrap();
        } else {
            net.join(&mut c, CODE).unwrap();
            net.join(&mut b, CODE).unwrap();
        }

        for step in schedule {
            let peer = match step {
                0 => &mut host,
                1 => &mut b,
                _ => &mut c,
            };
            peer.session.poll(net.now());
        }
        net.settle(&mut [&mut host, &mut b, &mut c]);

        let roster = host.members();
        prop_assert!(
            roster == names(&["H", "B", "C"]) || roster == names(&["H", "C", "B"]),
            "host ended with {:?}",
            roster
        );
        prop_assert_eq!(&b.members(), &roster);
        prop_assert_eq!(&c.members(), &roster);
        prop_assert_eq!(b.last_snapshot(), Some(roster.clone()));
        prop_assert_eq!(c.last_snapshot(), Some(roster));
        prop_assert!(b.errors().is_empty() && c.errors().is_empty());
    }
}
