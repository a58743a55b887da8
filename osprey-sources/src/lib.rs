//! Osprey Sources
//!
//! External collaborators of the artifact pipeline:
//! - **Analyzers**: VirusTotal Intelligence, Onyphe, plain indicator feeds
//! - **Enrichers**: WHOIS (RDAP), Google Public DNS, IPInfo, Shodan InternetDB
//! - **Emitters**: console, webhook
//!
//! [`Registry`] turns the names used in a rule into instances.

pub mod console;
pub mod dns;
pub mod feed;
pub mod ipinfo;
pub mod memo;
pub mod onyphe;
pub mod registry;
pub mod shodan;
pub mod traits;
pub mod virustotal;
pub mod webhook;
pub mod whois;

pub use console::*;
pub use dns::*;
pub use feed::*;
pub use ipinfo::*;
pub use memo::*;
pub use onyphe::*;
pub use registry::*;
pub use shodan::*;
pub use traits::*;
pub use virustotal::*;
pub use webhook::*;
pub use whois::*;
