//! BlueMap integration: player lookup on the live map and location screenshots.

mod client;
mod link;
mod renderer;
mod webdriver;
mod worker;

pub use client::{MapClient, MapSettings, Position};
pub use link::deep_link;
pub use renderer::{MapRenderer, RenderPage, Viewport};
pub use webdriver::{WebDriverPage, WebDriverRenderer};
pub use worker::{MapSnapshotWorker, SnapshotOptions};
