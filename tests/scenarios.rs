// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use dist_object::{substrate::InProcessSubstrate, ConstructionMode, DistObject, LocalityId};
use pretty_assertions::assert_eq;

/// P1 (name coverage) + P2 (self-fetch identity): after every participant
/// has returned from construction, any `i, j` pair resolves, and a
/// locality's own `fetch` agrees with its `local()`.
#[tokio::test(flavor = "multi_thread")]
async fn name_coverage_and_self_fetch_identity() {
    let net = InProcessSubstrate::network(3);

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        tasks.push(tokio::spawn(async move {
            let here = substrate.here();
            let value = here.0 as i64 * 10;
            let obj = DistObject::new_with_mode(substrate.clone(), "p1p2", value, ConstructionMode::AllToAll)
                .await
                .unwrap();
            substrate.barrier("p1p2", 3).await;

            let local = *obj.local().await.unwrap();
            let self_fetch = obj.fetch(here).await.unwrap();
            assert_eq!(local, self_fetch);

            let mut peers = Vec::new();
            for j in 0..3u32 {
                peers.push((j, obj.fetch(LocalityId(j)).await.unwrap()));
            }
            peers
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        all.push(task.await.unwrap());
    }

    for peers in &all {
        for (j, value) in peers {
            assert_eq!(*value, (*j as i64) * 10, "every participant sees j's value as j*10");
        }
    }
}

/// Scenario 4: reduction to locality 0.
#[tokio::test(flavor = "multi_thread")]
async fn reduction_to_locality_zero() {
    const N: usize = 5;
    let net = InProcessSubstrate::network(N);

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        tasks.push(tokio::spawn(async move {
            let here = substrate.here();
            let obj = DistObject::new_with_mode(substrate.clone(), "reduce", here.0 as i64, ConstructionMode::AllToAll)
                .await
                .unwrap();
            substrate.barrier("reduce", N).await;

            if here == LocalityId(0) {
                let mut sum = 0i64;
                for i in 0..N as u32 {
                    sum += obj.fetch(LocalityId(i)).await.unwrap();
                }
                Some(sum)
            } else {
                None
            }
        }));
    }

    let mut root_sum = None;
    for task in tasks {
        if let Some(sum) = task.await.unwrap() {
            root_sum = Some(sum);
        }
    }

    let expected: i64 = (0..N as i64).sum();
    assert_eq!(root_sum, Some(expected));
}

/// Scenario 5: observer mode. Participants {0, 2}; locality 1 observes and
/// eventually sees the full 2-entry member map.
#[tokio::test(flavor = "multi_thread")]
async fn observer_sees_full_member_map() {
    let net = InProcessSubstrate::network(3);
    let locs: std::collections::BTreeSet<LocalityId> =
        [LocalityId(0), LocalityId(2)].into_iter().collect();

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        let locs = locs.clone();
        tasks.push(tokio::spawn(async move {
            let here = substrate.here();
            if here == LocalityId(1) {
                let obj = DistObject::new_with_mode_and_locs(
                    substrate,
                    "observed",
                    0i64,
                    ConstructionMode::MetaObject,
                    locs,
                )
                .await
                .unwrap();
                assert!(
                    obj.local().await.is_err(),
                    "an observer holds no partition of its own"
                );
                Some(obj.fetch(LocalityId(0)).await.unwrap() + obj.fetch(LocalityId(2)).await.unwrap())
            } else {
                let obj = DistObject::new_with_mode_and_locs(
                    substrate,
                    "observed",
                    here.0 as i64,
                    ConstructionMode::MetaObject,
                    locs,
                )
                .await
                .unwrap();
                let _ = obj.local().await.unwrap();
                None
            }
        }));
    }

    let mut observed = None;
    for task in tasks {
        if let Some(sum) = task.await.unwrap() {
            observed = Some(sum);
        }
    }
    assert_eq!(observed, Some(0 + 2));
}

/// P4 (handle independence): two distributed objects with distinct
/// basenames on the same localities never see each other's registrations.
#[tokio::test(flavor = "multi_thread")]
async fn distinct_basenames_stay_independent() {
    let net = InProcessSubstrate::network(2);

    let a = DistObject::new(net[0].clone(), "obj_a", 1i32).await.unwrap();
    let b = DistObject::new(net[0].clone(), "obj_b", 2i32).await.unwrap();

    let _ = DistObject::new(net[1].clone(), "obj_a", 10i32).await.unwrap();
    let _ = DistObject::new(net[1].clone(), "obj_b", 20i32).await.unwrap();

    assert_eq!(a.fetch(LocalityId(1)).await.unwrap(), 10);
    assert_eq!(b.fetch(LocalityId(1)).await.unwrap(), 20);
}

/// P5 (idempotent resolution): repeated `fetch(i)` on one handle issues at
/// most one `lookup_name` across the handle's lifetime.
#[tokio::test(flavor = "multi_thread")]
async fn repeated_fetch_issues_one_lookup() {
    let net = InProcessSubstrate::network(2);
    let a = DistObject::new(net[0].clone(), "p5", 1i32).await.unwrap();
    let _b = DistObject::new(net[1].clone(), "p5", 2i32).await.unwrap();

    let before = net[0].lookups_issued();
    for _ in 0..5 {
        assert_eq!(a.fetch(LocalityId(1)).await.unwrap(), 2);
    }
    let after = net[0].lookups_issued();

    assert_eq!(after - before, 1, "only the first fetch(1) should resolve the peer name");
}

/// Single-locality configuration: Meta_Object with `expected_count = 1`
/// completes without cross-node communication.
#[tokio::test(flavor = "multi_thread")]
async fn single_locality_meta_object() {
    let net = InProcessSubstrate::network(1);
    let obj = DistObject::new_with_mode(net[0].clone(), "solo_meta", 99i32, ConstructionMode::MetaObject)
        .await
        .unwrap();
    assert_eq!(obj.fetch(LocalityId(0)).await.unwrap(), 99);
}
