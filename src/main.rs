// Xephyr -br -ac -noreset -screen 800x600 :1
#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
// #![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
// #![warn(clippy::restriction)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

mod atoms;
mod client;
mod config;
mod connection;
mod drag;
mod events;
mod geometry;
mod hints;
mod keys;
mod registry;
mod state;
mod tags;
#[cfg(test)]
mod testing;
mod tile;
use crate::{
    config::{Config, ConfigDeserialized},
    connection::ConnectionHandler,
    events::EventHandler,
    keys::KeyHandler,
    state::StateHandler,
};
use x11rb::connection::Connection;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .init();

    let (conn, screen_num) = x11rb::connect(None)?;
    let config = Config::from(ConfigDeserialized::new());
    let keys = KeyHandler::new(&conn, &config)?;
    let conn_handler = ConnectionHandler::new(&conn, screen_num, &config, &keys)?;
    let state = StateHandler::new(
        &config,
        conn_handler.screen_rects()?,
        conn_handler.root_rect(),
    );
    state.publish_globals(&conn_handler)?;

    let mut event_handler = EventHandler {
        conn: &conn_handler,
        state,
        key: keys,
    };

    for window in conn_handler.existing_windows()? {
        if let Err(e) = event_handler.state.manage(&conn_handler, window) {
            log::error!("{e}");
        }
    }

    loop {
        conn.flush()?;
        let event = conn.wait_for_event()?;
        let mut event_as_option = Some(event);

        while let Some(event) = event_as_option {
            if let Err(e) = event_handler.handle_event(&event) {
                log::error!("{e}");
            }
            event_as_option = conn_handler
                .take_deferred()
                .or_else(|| conn.poll_for_event().unwrap_or_default());
        }
    }
}
