pub mod audio;
pub mod events;
pub mod menu;
pub mod message;
pub mod session;
pub mod tools;

pub use events::{ClientEvent, LiveEvent, ServerMessage};
pub use menu::{CartItem, Category, Diet, Dish, Menu};
pub use message::{ChatMessage, MessageId, Role};
pub use session::SessionSetup;
pub use tools::{FunctionCall, FunctionDeclaration, FunctionResponse};
