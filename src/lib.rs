//! hwc-provider - Huawei Cloud CBR and SWR Enterprise resources
//!
//! Translates between a flat attribute model and the cloud REST APIs:
//! data sources are declared in embedded JSON and read through an offset
//! paginator, managed resources implement a create/read/update/delete
//! lifecycle, and one-shot actions are exposed as resources.

pub mod cloud;
pub mod config;
pub mod provider;
pub mod resource;
pub mod services;
