//! Integration tests of the dockhand core


mod test_action_state;
mod test_executor;
mod test_periphery;
mod test_storage;
mod test_update_log;
mod test_ws;
