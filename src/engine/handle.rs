use super::{
    EngineCommand,
    Trigger,
};
use crate::{
    bus::{
        SnapshotHandler,
        Subscription,
    },
    gateway::{
        GatewayError,
        ProviderGateway,
    },
    snapshot::{
        Address,
        WalletSnapshot,
    },
};
use networks::{
    ChainId,
    SupportedNetworks,
};
use std::sync::Arc;
use tokio::sync::{
    mpsc,
    oneshot,
    watch,
};
use tracing::{
    info,
    warn,
};

/// Failure of a user-initiated action. The engine itself never surfaces
/// these as snapshots; the caller shows them once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("network {0} is not one of the supported networks")]
    UnsupportedTarget(ChainId),
    #[error("could not add {network} to the wallet: {cause}\n{manual}")]
    AddNetworkFailed {
        network: String,
        cause: GatewayError,
        manual: String,
    },
    #[error("the wallet engine is not running")]
    EngineStopped,
}

/// Cloneable front door to a running [`super::Engine`].
pub struct EngineHandle<G> {
    gateway: Arc<G>,
    networks: Arc<SupportedNetworks>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    published: watch::Receiver<Option<WalletSnapshot>>,
}

impl<G> Clone for EngineHandle<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            networks: self.networks.clone(),
            commands: self.commands.clone(),
            published: self.published.clone(),
        }
    }
}

impl<G: ProviderGateway> EngineHandle<G> {
    pub(crate) fn new(
        gateway: Arc<G>,
        networks: Arc<SupportedNetworks>,
        commands: mpsc::UnboundedSender<EngineCommand>,
        published: watch::Receiver<Option<WalletSnapshot>>,
    ) -> Self {
        Self {
            gateway,
            networks,
            commands,
            published,
        }
    }

    /// Last published snapshot, `None` until the first pass completes.
    pub fn snapshot(&self) -> Option<WalletSnapshot> {
        self.published.borrow().clone()
    }

    pub fn updates(&self) -> watch::Receiver<Option<WalletSnapshot>> {
        self.published.clone()
    }

    pub fn networks(&self) -> &SupportedNetworks {
        &self.networks
    }

    /// Requests an unconditional pass. Publishes nothing if the state is
    /// unchanged.
    pub fn force_refresh(&self) -> Result<(), ActionError> {
        self.send(EngineCommand::Trigger(Trigger::ForceRefresh))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    /// Adds a consumer to a running engine. The handler is called with the
    /// current snapshot, if any, before the subscription is returned.
    pub async fn subscribe(
        &self,
        consumer: impl Into<String>,
        handler: SnapshotHandler,
    ) -> Result<Subscription, ActionError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Subscribe {
            consumer: consumer.into(),
            handler,
            reply,
        })?;
        response.await.map_err(|_| ActionError::EngineStopped)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> Result<(), ActionError> {
        self.send(EngineCommand::Unsubscribe(subscription))
    }

    /// Prompts the wallet for account access, then reconciles. Rejection
    /// leaves the published state untouched.
    pub async fn connect(&self) -> Result<Address, ActionError> {
        if !self.gateway.is_available() {
            return Err(GatewayError::ProviderUnavailable.into());
        }
        let accounts = self.gateway.request_accounts().await.inspect_err(|e| {
            warn!(error = %e, "connect request failed");
        })?;
        let account = accounts.into_iter().next().ok_or_else(|| {
            GatewayError::ProviderError("wallet granted no accounts".to_string())
        })?;
        info!(account = %account.short(), "wallet connected");
        self.send(EngineCommand::Trigger(Trigger::Connect))?;
        Ok(account)
    }

    /// Asks the wallet to switch to `target`. A wallet that does not know the
    /// network is asked to add it; if that fails too, the error carries
    /// manual setup instructions.
    pub async fn switch_network(&self, target: ChainId) -> Result<(), ActionError> {
        let entry = self
            .networks
            .get(target)
            .ok_or(ActionError::UnsupportedTarget(target))?;
        match self.gateway.request_network_switch(target).await {
            Ok(()) => {}
            Err(GatewayError::NetworkUnknownToProvider(_)) => {
                info!(network = %entry.display_name, "wallet does not know network, requesting add");
                if let Err(cause) = self.gateway.request_add_network(entry).await {
                    warn!(network = %entry.display_name, error = %cause, "add network failed");
                    return Err(ActionError::AddNetworkFailed {
                        network: entry.display_name.clone(),
                        cause,
                        manual: entry.manual_setup_instructions(),
                    });
                }
            }
            Err(e) => {
                warn!(chain_id = %target, error = %e, "network switch failed");
                return Err(e.into());
            }
        }
        info!(network = %entry.display_name, "network switch requested");
        self.send(EngineCommand::Trigger(Trigger::SwitchNetwork))
    }

    /// Switches to whatever the current snapshot suggests: the primary
    /// network from an unsupported one, otherwise the other supported one.
    pub async fn switch_to_suggested(&self) -> Result<ChainId, ActionError> {
        let current = self.snapshot().and_then(|s| s.chain_id());
        let target = self.networks.switch_target(current).chain_id;
        self.switch_network(target).await?;
        Ok(target)
    }

    fn send(&self, command: EngineCommand) -> Result<(), ActionError> {
        self.commands
            .send(command)
            .map_err(|_| ActionError::EngineStopped)
    }
}
