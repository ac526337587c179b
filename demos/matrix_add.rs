// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Two-locality 5x5 matrix element-wise add and double, mirroring the second
//! end-to-end scenario: each locality holds a `5x5` matrix of `42.0 + here`,
//! adds it to itself locally, then cross-fetches the peer's result.

use dist_object::{ConstructionMode, DistObject, LocalityId};

const SIDE: usize = 5;

type Matrix = Vec<Vec<f64>>;

fn filled(value: f64) -> Matrix {
    vec![vec![value; SIDE]; SIDE]
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let net = dist_object::substrate::InProcessSubstrate::network(2);

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        tasks.push(tokio::spawn(async move {
            let here = substrate.here().0 as f64;
            let src = filled(42.0 + here);
            let res = filled(0.0);

            let src =
                DistObject::new_with_mode(substrate.clone(), "mat_src", src, ConstructionMode::AllToAll)
                    .await
                    .expect("construct src");
            let res =
                DistObject::new_with_mode(substrate.clone(), "mat_res", res, ConstructionMode::AllToAll)
                    .await
                    .expect("construct res");

            substrate.barrier("matrix_add", 2).await;

            {
                let src_guard = src.local().await.expect("local src");
                let mut res_guard = res.local().await.expect("local res");
                for row in 0..SIDE {
                    for col in 0..SIDE {
                        res_guard[row][col] = src_guard[row][col] + src_guard[row][col];
                    }
                }
            }

            let other = LocalityId(1 - substrate.here().0);
            let remote = res.fetch(other).await.expect("fetch peer res");
            (substrate.here(), res.local().await.unwrap().clone(), remote)
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.expect("locality task panicked"));
    }
    results.sort_by_key(|(id, _, _)| id.0);

    let (_, res0, remote1) = &results[0];
    let (_, res1, remote0) = &results[1];

    assert_eq!(res0[0][0], 84.0, "locality 0 doubles 42.0");
    assert_eq!(res1[0][0], 86.0, "locality 1 doubles 43.0");
    assert_eq!(remote1[0][0], 86.0, "locality 0 fetching locality 1's res");
    assert_eq!(remote0[0][0], 84.0, "locality 1 fetching locality 0's res");

    println!("matrix add across 2 localities: ok");
}
