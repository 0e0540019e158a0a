//! # Events Module
//!
//! Progress reporting decoupled from presentation.
//!
//! ## Design
//! The organizer emits events through a channel; the CLI (or any other
//! front end) subscribes and renders them. The core never prints.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Execute(ExecuteEvent::Progress(p)) = event {
//!             println!("{}/{}", p.completed, p.total);
//!         }
//!     }
//! });
//!
//! organizer.run(&sender, &CancellationToken::new())?;
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender};
pub use types::*;
