//! Flutter-facing bindings for Yoga Log core.

pub mod api;
