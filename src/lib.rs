// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod animation;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fragments;
pub mod manager;
pub mod render;
pub mod rpc;
pub mod scheduler;
pub mod time_utils;
pub mod view;
pub mod zoom;
