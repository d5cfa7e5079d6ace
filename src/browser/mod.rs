pub mod capability;
pub mod chrome;
pub mod connection;
#[cfg(test)]
pub mod fake;
pub mod headless;

pub use capability::{BrowserSession, SessionFactory};
pub use chrome::{ChromeSession, ChromeSessionFactory};
pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;
