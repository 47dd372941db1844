use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use saferoute_channel::EventChannel;
use saferoute_navigation::NavigationSessionController;
use saferoute_navigation::RouteSearch;
use saferoute_navigation::SessionBinding;
use saferoute_navigation::SessionSnapshot;
use saferoute_navigation::StaticRouteSearch;
use saferoute_protocol::Coordinate;
use saferoute_protocol::Destination;
use saferoute_protocol::LocationSample;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;
use tracing::warn;

use crate::config::SafeRouteConfig;

/// Pick the safest route to a destination and follow live location updates
/// from the navigation server until interrupted.
#[derive(Debug, clap::Parser)]
pub struct NavigateArgs {
    /// Destination latitude.
    #[arg(long = "to-lat", allow_negative_numbers = true)]
    pub to_lat: f64,

    /// Destination longitude.
    #[arg(long = "to-lon", allow_negative_numbers = true)]
    pub to_lon: f64,

    /// Label shown for the destination, as picked from a suggestion list.
    #[arg(long)]
    pub label: Option<String>,

    /// Starting latitude. Without a start the session waits for the server
    /// to report a location.
    #[arg(long = "from-lat", allow_negative_numbers = true, requires = "from_lon")]
    pub from_lat: Option<f64>,

    /// Starting longitude.
    #[arg(long = "from-lon", allow_negative_numbers = true, requires = "from_lat")]
    pub from_lon: Option<f64>,

    /// JSON file with candidate routes (`id`, `name`, `eta`, `risk`,
    /// `coordinates`).
    #[arg(long)]
    pub routes: PathBuf,

    /// Use this route instead of the preferred one.
    #[arg(long)]
    pub route: Option<String>,

    /// Stop navigating after this many seconds instead of waiting for Ctrl-C.
    #[arg(long = "duration-secs")]
    pub duration_secs: Option<u64>,
}

impl NavigateArgs {
    /// Drives the whole session on the current thread; the channel and the
    /// controller are `!Send`.
    pub async fn run(self, config: &SafeRouteConfig) -> Result<()> {
        let raw = std::fs::read_to_string(&self.routes)
            .with_context(|| format!("failed to read routes from {}", self.routes.display()))?;
        let search = StaticRouteSearch::from_json(&raw)
            .with_context(|| format!("invalid routes in {}", self.routes.display()))?;

        let controller = Rc::new(RefCell::new(NavigationSessionController::new()));
        if let (Some(lat), Some(lon)) = (self.from_lat, self.from_lon) {
            controller
                .borrow_mut()
                .on_location_update(LocationSample::now(Coordinate::new(lat, lon)));
        }

        let target = Coordinate::new(self.to_lat, self.to_lon);
        let destination = match self.label {
            Some(label) => Destination::from_suggestion(label, target),
            None => Destination::from_map_pick(target),
        };
        controller.borrow_mut().set_destination(Some(destination));

        let pending = controller.borrow_mut().begin_search()?;
        let found = search.search(&pending.query).await;
        let preferred = controller.borrow_mut().complete_search(pending, found)?;
        if let Some(route_id) = &self.route {
            controller.borrow_mut().select_route(route_id)?;
        }
        print_routes(&controller.borrow().snapshot(), preferred.id());

        let mut channel = EventChannel::new();
        let binding = SessionBinding::attach(&mut channel, &controller);
        let outcome = follow(&mut channel, &controller, config, self.duration_secs).await;
        binding.detach(&mut channel);
        channel.close().await;
        outcome
    }
}

fn print_routes(snapshot: &SessionSnapshot, preferred: &str) {
    for route in &snapshot.candidates {
        let marker = if route.id() == preferred { "*" } else { " " };
        println!(
            "{marker} {} [{}] {} ({})",
            route.id(),
            route.name(),
            route.eta_label(),
            route.risk_tier().label()
        );
    }
    if let Some(route) = &snapshot.session.selected_route {
        println!("Selected route: {}", route.name());
    }
}

async fn follow(
    channel: &mut EventChannel,
    controller: &Rc<RefCell<NavigationSessionController>>,
    config: &SafeRouteConfig,
    duration_secs: Option<u64>,
) -> Result<()> {
    if !channel.connect(&config.socket_url, config.connect_options()) {
        return Err(terminal_error(channel));
    }
    while !channel.is_connected() {
        if !channel.pump().await {
            return Err(terminal_error(channel));
        }
    }
    info!(url = %config.socket_url, "connected to navigation server");

    let mut updates = controller.borrow().subscribe();
    if controller.borrow().session().last_known_location.is_none() {
        println!("Waiting for a location fix...");
    }
    while controller.borrow().session().last_known_location.is_none() {
        if !channel.pump().await {
            return Err(terminal_error(channel));
        }
    }

    controller.borrow_mut().start_navigating(&*channel)?;
    let destination = controller
        .borrow()
        .session()
        .destination
        .as_ref()
        .map(Destination::display_label)
        .unwrap_or_default();
    println!("Navigating to {destination}. Press Ctrl-C to stop.");
    updates.mark_unchanged();

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut last_error = None;
    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for Ctrl-C");
                }
                break Ok(());
            }
            _ = &mut deadline => break Ok(()),
            alive = channel.pump() => {
                if !alive {
                    break Err(terminal_error(channel));
                }
            }
        }
        if updates.has_changed().unwrap_or(false) {
            let snapshot = updates.borrow_and_update().clone();
            if let Some(location) = &snapshot.session.last_known_location {
                println!("Location: {}", location.coordinate);
            }
            if snapshot.connectivity_error != last_error {
                if let Some(error) = &snapshot.connectivity_error {
                    println!("Connection problem: {error}");
                }
                last_error = snapshot.connectivity_error;
            }
        }
    };

    // The controller stays navigating when the channel died; stop needs no
    // delivery to succeed locally.
    if let Err(err) = controller.borrow_mut().stop_navigating(&*channel) {
        warn!(error = %err, "could not stop navigation");
    } else {
        println!("Navigation stopped.");
    }
    result
}

fn terminal_error(channel: &mut EventChannel) -> anyhow::Error {
    match channel.take_terminal_error() {
        Some(error) => anyhow!("could not reach the navigation server: {error}"),
        None => anyhow!("navigation server closed the connection"),
    }
}
