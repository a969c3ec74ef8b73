//! Сокетный вариант протокола «ключ/значение».
//!
//! ## Подмодули
//!
//! - `session`: асинхронная сессия над принятым соединением (состояния
//!   `Idle`/`Reading`, трейт обработчика записей).
//! - `server`: цикл приёма соединений с лимитом и сигналом остановки.
//! - `orders`: обработчик-пример, собирающий удалённые заказы.

pub mod orders;
pub mod server;
pub mod session;

pub use orders::{OrderCollector, OrderItem, RemoteOrder};
pub use server::{serve_sidecar, ServerConfig};
pub use session::{Flow, RecordHandler, SessionState, SidecarSession, DONE_KEY};
