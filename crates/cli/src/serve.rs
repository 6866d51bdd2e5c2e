use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use jobpay_core::api::{ApiState, RedirectPages, create_router};
use jobpay_core::db::DbManager;
use jobpay_core::facade::PaymentFacade;
use jobpay_core::wallet::{CallbackUrls, WalletService};
use jobpay_driver_campay::{CampayClient, CampayCredentials};
use jobpay_driver_monetbil::{MonetbilClient, MonetbilCredentials};
use jobpay_driver_payunit::{PayunitClient, PayunitCredentials};
use tracing::info;

use crate::manifest::{Manifest, resolve_secret};

#[derive(Args, PartialEq, Clone, Debug)]
pub struct ServeCommand {
    /// Override the listen address from the manifest
    #[arg(long = "listen", short = 'l')]
    pub listen: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, manifest: &Manifest) -> anyhow::Result<()> {
        let facade = build_facade(manifest)?;
        let db = Arc::new(
            DbManager::new(&manifest.database.url)
                .with_context(|| format!("failed to open database {}", manifest.database.url))?,
        );

        let gateway: Arc<dyn jobpay_core::facade::Gateway> = Arc::new(facade);
        let wallet = Arc::new(WalletService::new(
            db.clone(),
            gateway.clone(),
            manifest.catalogs.effective_services(),
            manifest.catalogs.effective_packs(),
            CallbackUrls::new(manifest.server.public_base_url.clone()),
            manifest.currency,
        ));
        let state = ApiState {
            db,
            gateway,
            wallet,
            pages: RedirectPages {
                success_url: manifest.server.success_url.clone(),
                failure_url: manifest.server.failure_url.clone(),
            },
        };

        let listen = self
            .listen
            .clone()
            .unwrap_or_else(|| manifest.server.listen.clone());
        let listener = tokio::net::TcpListener::bind(&listen)
            .await
            .with_context(|| format!("failed to bind {listen}"))?;
        info!(
            listen = %listen,
            public_base_url = %manifest.server.public_base_url,
            "jobpay payment service listening"
        );
        axum::serve(listener, create_router(state))
            .await
            .context("server terminated")?;
        Ok(())
    }
}

/// Build the production gateway from manifest credentials. Placeholders are
/// resolved against the environment here so a missing secret fails at
/// startup, not on the first payment.
pub fn build_facade(manifest: &Manifest) -> anyhow::Result<PaymentFacade> {
    let pu = &manifest.providers.payunit;
    let payunit = PayunitClient::new(PayunitCredentials::new(
        &resolve_secret(&pu.api_user)?,
        &resolve_secret(&pu.api_password)?,
        &resolve_secret(&pu.api_key)?,
        pu.base_url.clone(),
    )?)?;

    let mb = &manifest.providers.monetbil;
    let monetbil = MonetbilClient::new(MonetbilCredentials::new(
        &resolve_secret(&mb.service_key)?,
        &resolve_secret(&mb.service_secret)?,
        mb.base_url.clone(),
    )?)?;

    let cp = &manifest.providers.campay;
    let campay = CampayClient::new(CampayCredentials::new(
        &resolve_secret(&cp.app_username)?,
        &resolve_secret(&cp.app_password)?,
        cp.base_url.clone(),
    )?)?;

    Ok(PaymentFacade::new(payunit, monetbil, campay))
}
