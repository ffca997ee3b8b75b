pub mod assets;
pub mod domains;
pub mod health;
pub mod projects;
pub mod scan_profiles;
pub mod scans;
pub mod targets;
pub mod tasks;
