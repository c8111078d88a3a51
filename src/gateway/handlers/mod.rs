pub mod health;
pub mod proxy;
pub mod recovery;
pub mod whois;
