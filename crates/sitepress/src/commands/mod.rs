pub mod build;
pub mod check;
pub mod dev;
pub mod init;
pub mod page;
pub mod serve;
pub mod sitemap;
