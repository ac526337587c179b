// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Two-locality vector add, as described in the end-to-end scenarios: each
//! locality constructs `lhs`, `rhs` and `res` distributed objects, barriers,
//! computes its own slice, then fetches the other locality's `res`.

use dist_object::{ConstructionMode, DistObject, LocalityId};

const LEN: usize = 10;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let net = dist_object::substrate::InProcessSubstrate::network(2);

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        tasks.push(tokio::spawn(async move {
            let here = substrate.here().0 as i32;

            let lhs = vec![here; LEN];
            let rhs = vec![here; LEN];
            let res = vec![0; LEN];

            let lhs = DistObject::new_with_mode(substrate.clone(), "lhs", lhs, ConstructionMode::AllToAll)
                .await
                .expect("construct lhs");
            let rhs = DistObject::new_with_mode(substrate.clone(), "rhs", rhs, ConstructionMode::AllToAll)
                .await
                .expect("construct rhs");
            let res = DistObject::new_with_mode(substrate.clone(), "res", res, ConstructionMode::AllToAll)
                .await
                .expect("construct res");

            substrate.barrier("vector_add", 2).await;

            {
                let mut res_guard = res.local().await.expect("local res");
                let lhs_guard = lhs.local().await.expect("local lhs");
                let rhs_guard = rhs.local().await.expect("local rhs");
                for i in 0..LEN {
                    res_guard[i] = lhs_guard[i] + rhs_guard[i];
                }
            }

            let other = LocalityId(1 - substrate.here().0);
            let remote_res = res.fetch(other).await.expect("fetch peer res");

            (substrate.here(), res.local().await.unwrap().clone(), remote_res)
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.expect("locality task panicked"));
    }
    results.sort_by_key(|(id, _, _)| id.0);

    let (loc0, res0, remote1) = &results[0];
    let (loc1, res1, remote0) = &results[1];
    assert_eq!(*loc0, LocalityId(0));
    assert_eq!(*loc1, LocalityId(1));
    assert_eq!(res0, &vec![0; LEN], "locality 0's res is 0+0");
    assert_eq!(res1, &vec![2; LEN], "locality 1's res is 1+1");
    assert_eq!(remote1, &vec![2; LEN], "locality 0 fetching locality 1's res");
    assert_eq!(remote0, &vec![0; LEN], "locality 1 fetching locality 0's res");

    println!("vector add across 2 localities: ok");
}
