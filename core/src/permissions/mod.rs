//! Permission model: admins and owners hold `Update`, everyone else what the
//! permission table grants.

pub mod resolver;
