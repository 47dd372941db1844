pub mod config;
pub mod navigate_cmd;
pub mod timelapse_cmd;

pub use config::ConfigOverrides;
pub use config::SafeRouteConfig;
pub use config::find_saferoute_home;
pub use navigate_cmd::NavigateArgs;
pub use timelapse_cmd::TimelapseArgs;
