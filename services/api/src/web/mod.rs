pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible
// to the binary that builds the web server router.
pub use rest::{
    create_session_handler, current_session_handler, delete_session_handler,
    find_specialists_handler, list_sessions_handler, select_session_handler,
    send_message_handler,
};
