#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod alert_policy;
pub mod api;
pub mod config;
pub mod geometry;
mod logs;
pub mod road_catalog;
pub mod road_locator;
pub mod route;
pub mod tracking_session;
