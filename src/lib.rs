// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod bootstrap;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod constants;
pub mod controllers;
pub mod error;
pub mod kubernetes;
pub mod leader;
pub mod manager;
pub mod pki;
pub mod plugins;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
