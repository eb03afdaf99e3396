use std::{sync::Arc, time::Duration};

use futures_util::future::{join, join_all};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::{DeliveryFailure, NotificationDeliveryError, PushClient, PushProvider};
use crate::{
    datastore::{
        options::{DeleteSubscriptionsOptions, SelectSubscriptionsOptions},
        Provider,
    },
    model::{CascadeOutcome, Device},
    Ctx, StoreResult,
};

/// A committed datastore result plus whatever the push side failed to do
/// for it. `delivery` never turns `value` into a failure.
#[derive(Debug)]
pub struct Delivered<T> {
    pub value: T,
    pub delivery: Option<NotificationDeliveryError>,
}

impl<T> Delivered<T> {
    pub fn clean(value: T) -> Self {
        Self { value, delivery: None }
    }

    pub fn is_clean(&self) -> bool {
        self.delivery.is_none()
    }
}

fn aggregate(failures: Vec<DeliveryFailure>) -> Option<NotificationDeliveryError> {
    if failures.is_empty() {
        None
    } else {
        Some(NotificationDeliveryError { failures })
    }
}

/// Keeps the push provider in step with datastore cascades.
///
/// Provider calls run concurrently, one channel each, only after the
/// datastore transaction has committed. Failures are collected rather than
/// retried: rows the provider has not confirmed stay logically deleted and
/// the sweeper picks them up later.
#[derive(Clone)]
pub struct Fanout {
    store: Arc<dyn Provider>,
    push: PushClient,
}

impl Fanout {
    pub fn new(store: Arc<dyn Provider>, push: Arc<dyn PushProvider>) -> Self {
        Self { store, push: PushClient::new(push) }
    }

    pub fn push(&self) -> &PushClient {
        &self.push
    }

    /// Unsubscribes invalidated subscriptions and deletes the endpoints of
    /// removed devices. Subscriptions the provider confirmed, or never knew
    /// about, are then removed from the datastore for good.
    #[instrument(
        target = "notification",
        skip_all,
        fields(devices = outcome.devices.len(), subscriptions = outcome.subscriptions.len())
    )]
    pub async fn dispatch(&self, ctx: &Ctx, outcome: &CascadeOutcome) -> Option<NotificationDeliveryError> {
        if outcome.is_empty() {
            return None;
        }

        let unsubscribes = outcome.subscriptions.iter().map(|subscription| {
            let call = subscription
                .notification_subscription_id
                .clone()
                .map(|id| (self.push.unsubscribe(id.clone()), id));
            let row_id = subscription.id;
            async move {
                match call {
                    None => Ok(row_id),
                    Some((channel, target)) => channel
                        .await
                        .map(|()| row_id)
                        .map_err(|error| DeliveryFailure { target, error }),
                }
            }
        });
        let endpoints = outcome
            .devices
            .iter()
            .filter_map(|device| device.notification_device_id.clone())
            .map(|id| {
                let channel = self.push.delete_endpoint(id.clone());
                async move { channel.await.map_err(|error| DeliveryFailure { target: id, error }) }
            });

        let (unsubscribed, deleted) = join(join_all(unsubscribes), join_all(endpoints)).await;

        let mut failures = Vec::new();
        let mut removable = Vec::new();
        for res in unsubscribed {
            match res {
                Ok(row_id) => removable.push(row_id),
                Err(failure) => failures.push(failure),
            }
        }
        failures.extend(deleted.into_iter().filter_map(Result::err));

        if !removable.is_empty() {
            let opts = DeleteSubscriptionsOptions::default().ids(removable);
            if let Err(err) = self.store.delete_subscriptions(ctx, &opts).await {
                warn!(target: "notification", error = %err, "unsubscribed rows left for the sweeper");
            }
        }

        let delivery = aggregate(failures);
        if let Some(err) = &delivery {
            error!(target: "notification", error = %err, "push fan-out incomplete");
        }
        delivery
    }

    /// Dispatches an already-committed cascade and pairs it with the result.
    pub async fn settle(&self, ctx: &Ctx, outcome: CascadeOutcome) -> Delivered<CascadeOutcome> {
        let delivery = self.dispatch(ctx, &outcome).await;
        Delivered { value: outcome, delivery }
    }

    /// Creates a push endpoint for the device's token, stores the device
    /// (update when one exists for the user and platform, insert otherwise)
    /// and tears down whatever the update invalidated.
    #[instrument(target = "notification", skip_all, fields(user_id = %device.user_id), err)]
    pub async fn register_device(&self, ctx: &Ctx, device: Device) -> StoreResult<Delivered<Device>> {
        let mut device = device;
        let mut failures = Vec::new();

        match self.push.create_endpoint(device.token.clone()).await {
            Ok(endpoint) => device.notification_device_id = endpoint,
            Err(error) => failures.push(DeliveryFailure { target: device.user_id.clone(), error }),
        }

        let stored = match self.store.update_device(ctx, &device).await {
            Ok(Some((updated, outcome))) => {
                device = updated;
                Ok(outcome)
            }
            Ok(None) => {
                let inserted = self.store.insert_device(ctx, &device).await;
                inserted.map(|inserted| {
                    device = inserted;
                    CascadeOutcome::default()
                })
            }
            Err(err) => Err(err),
        };
        let outcome = match stored {
            Ok(outcome) => outcome,
            Err(err) => {
                // the endpoint was created for a device that never got stored
                if let Some(endpoint) = device.notification_device_id.take() {
                    let channel = self.push.delete_endpoint(endpoint);
                    tokio::spawn(async move {
                        if let Err(err) = channel.await {
                            warn!(target: "notification", error = %err, "orphaned endpoint left behind");
                        }
                    });
                }
                return Err(err);
            }
        };

        if let Some(err) = self.dispatch(ctx, &outcome).await {
            failures.extend(err.failures);
        }
        Ok(Delivered { value: device, delivery: aggregate(failures) })
    }

    /// One reconciliation pass over logically deleted subscriptions. The
    /// value is how many rows were cleared.
    #[instrument(target = "notification", skip_all, err)]
    pub async fn sweep(&self, ctx: &Ctx, opts: &SelectSubscriptionsOptions) -> StoreResult<Delivered<usize>> {
        let subscriptions = self.store.select_deleted_subscriptions(ctx, opts).await?;
        let total = subscriptions.len();
        let outcome = CascadeOutcome { devices: Vec::new(), subscriptions };
        let delivery = self.dispatch(ctx, &outcome).await;
        let failed = delivery.as_ref().map_or(0, NotificationDeliveryError::len);
        Ok(Delivered { value: total - failed, delivery })
    }

    /// Runs [`Fanout::sweep`] every `interval` until `ctx` is done.
    pub fn spawn_sweeper(&self, interval: Duration, ctx: Ctx) -> JoinHandle<()> {
        let fanout = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ctx.done() => {
                        info!(target: "notification", "subscription sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match fanout.sweep(&ctx, &SelectSubscriptionsOptions::default()).await {
                            Ok(Delivered { value, .. }) if value > 0 => {
                                info!(target: "notification", cleared = value, "swept deleted subscriptions");
                            }
                            Ok(_) => {}
                            Err(err) => warn!(target: "notification", error = %err, "subscription sweep failed"),
                        }
                    }
                }
            }
        })
    }
}
