// Copyright © 2022 The Radicle Link Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Matrix transpose across `N` localities, one row per locality, using
//! `Meta_Object` construction so every locality has the full peer map before
//! it starts fetching rows to transpose.

use dist_object::{ConstructionMode, DistObject};

const N: usize = 3;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let net = dist_object::substrate::InProcessSubstrate::network(N);

    let mut tasks = Vec::new();
    for substrate in net.into_iter() {
        tasks.push(tokio::spawn(async move {
            let here = substrate.here().0 as usize;
            let row: Vec<f64> = (0..N).map(|col| (here * N + col) as f64).collect();

            let rows = DistObject::new_with_mode(substrate, "matrix_row", row, ConstructionMode::MetaObject)
                .await
                .expect("construct row (all localities participate by default)");

            let mut transposed = vec![0.0; N];
            for j in 0..N {
                let peer_row = rows
                    .fetch(dist_object::LocalityId(j as u32))
                    .await
                    .expect("fetch peer row");
                transposed[j] = peer_row[here];
            }

            (here, transposed)
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.expect("locality task panicked"));
    }
    results.sort_by_key(|(here, _)| *here);

    for (here, transposed) in &results {
        for j in 0..N {
            let expected = (j * N + here) as f64;
            assert_eq!(transposed[*j], expected, "transposed[{here}][{j}]");
        }
    }

    println!("matrix transpose across {N} localities: ok");
}
