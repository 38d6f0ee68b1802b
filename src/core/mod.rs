pub mod defaults;
pub mod dispatcher;
pub mod error;
pub mod fields;
pub mod poster;
pub mod registry;
pub mod renderer;
pub mod template;
pub mod uploads;
