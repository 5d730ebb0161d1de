//! # Image Assurance Operator
//!
//! Kubernetes operator that installs and maintains the Image Assurance
//! component: it provisions database credentials and certificates, runs the
//! schema migrator, deploys the API, scanner and admission workloads, and
//! keeps the organization settings mirrored into the cluster.

use anyhow::Result;
use image_assurance_operator::runtime::initialization::initialize;
use image_assurance_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.client,
        init.reconciler,
        init.server_state,
        init.cancel,
        init.syncer_done,
    )
    .await
}
