use crate::controller::NavigationSessionController;
use anyhow::Context;
use saferoute_channel::ChannelEvent;
use saferoute_channel::ConnectivityError;
use saferoute_channel::EventChannel;
use saferoute_channel::Handler;
use saferoute_channel::handler;
use saferoute_protocol::LocationSample;
use saferoute_protocol::events;
use saferoute_protocol::events::NavigationUpdate;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use tracing::info;

type SharedController = Rc<RefCell<NavigationSessionController>>;

/// Channel subscriptions feeding one controller. Dropping the binding does
/// not unsubscribe; call [`SessionBinding::detach`].
pub struct SessionBinding {
    handlers: Vec<(&'static str, Handler)>,
}

impl SessionBinding {
    pub fn attach(channel: &mut EventChannel, controller: &SharedController) -> Self {
        let handlers = vec![
            (events::NAVIGATION_UPDATE, location_handler(controller)),
            (events::CONNECT, connect_handler(controller)),
            (events::CONNECT_ERROR, connect_error_handler(controller)),
            (events::DISCONNECT, disconnect_handler(controller)),
        ];
        for (name, handler) in &handlers {
            channel.subscribe(name, handler);
        }
        Self { handlers }
    }

    pub fn detach(self, channel: &mut EventChannel) {
        for (name, handler) in &self.handlers {
            channel.unsubscribe(name, handler);
        }
    }
}

fn location_handler(controller: &SharedController) -> Handler {
    let controller = Rc::clone(controller);
    handler(move |event| {
        let Some(update) = event.decode::<NavigationUpdate>() else {
            return Ok(());
        };
        let update = update.context("malformed navigation_update payload")?;
        match update.coordinate() {
            Some(coordinate) => {
                controller
                    .try_borrow_mut()
                    .context("session controller is busy")?
                    .on_location_update(LocationSample::now(coordinate));
            }
            None => debug!("ignoring navigation_update without a location"),
        }
        Ok(())
    })
}

fn connect_handler(controller: &SharedController) -> Handler {
    let controller = Rc::clone(controller);
    handler(move |_| {
        controller
            .try_borrow_mut()
            .context("session controller is busy")?
            .set_connectivity_error(None);
        Ok(())
    })
}

fn connect_error_handler(controller: &SharedController) -> Handler {
    let controller = Rc::clone(controller);
    handler(move |event| {
        if let ChannelEvent::ConnectError { error } = event {
            controller
                .try_borrow_mut()
                .context("session controller is busy")?
                .set_connectivity_error(Some(error.clone()));
        }
        Ok(())
    })
}

fn disconnect_handler(controller: &SharedController) -> Handler {
    let controller = Rc::clone(controller);
    handler(move |event| {
        let ChannelEvent::Disconnect { reason } = event else {
            return Ok(());
        };
        info!(%reason, "navigation channel disconnected");
        controller
            .try_borrow_mut()
            .context("session controller is busy")?
            .set_connectivity_error(Some(ConnectivityError::ConnectionLost {
                reason: reason.clone(),
            }));
        Ok(())
    })
}
