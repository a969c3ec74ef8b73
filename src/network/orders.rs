//! Пример вызывающего кода для сокетных сессий: собирает удалённые заказы
//! из потока пар `ключ: значение`.
//!
//! Заказ начинается с `OrderID`, позиции описываются ключами `Item`, `Qty`,
//! `Price` и закрываются `EndItem`, заказ закрывается `EndOrder`.
//! Неизвестные ключи игнорируются.

use posdata_error::{PosResult, SidecarError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::{Flow, RecordHandler};
use crate::{engine::Money, sidecar::KeyValue};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: Money,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOrder {
    pub id: String,
    pub items: Vec<OrderItem>,
}

impl RemoteOrder {
    pub fn total(&self) -> Money {
        Money::from_cents(
            self.items
                .iter()
                .map(|i| i.price.cents() * i64::from(i.quantity))
                .sum(),
        )
    }
}

/// Обработчик, отправляющий готовые заказы в канал.
#[derive(Debug)]
pub struct OrderCollector {
    current: Option<RemoteOrder>,
    item: OrderItem,
    sink: mpsc::UnboundedSender<RemoteOrder>,
}

impl OrderCollector {
    pub fn new(sink: mpsc::UnboundedSender<RemoteOrder>) -> Self {
        Self {
            current: None,
            item: OrderItem::default(),
            sink,
        }
    }

    fn order(&mut self) -> &mut RemoteOrder {
        self.current.get_or_insert_with(RemoteOrder::default)
    }
}

fn bad_value(
    record: &KeyValue,
    what: &str,
) -> SidecarError {
    SidecarError::Handler {
        key: record.key.clone(),
        reason: format!("{what} {:?}", record.value),
    }
}

impl RecordHandler for OrderCollector {
    fn on_record(
        &mut self,
        record: &KeyValue,
    ) -> PosResult<Flow> {
        match record.key.to_ascii_lowercase().as_str() {
            "orderid" => self.order().id = record.value.clone(),
            "item" => self.item.name = record.value.clone(),
            "qty" => {
                self.item.quantity = record
                    .parse()
                    .ok_or_else(|| bad_value(record, "invalid quantity"))?;
            }
            "price" => {
                let price: f64 = record
                    .parse()
                    .ok_or_else(|| bad_value(record, "invalid price"))?;
                self.item.price = Money::from_f64(price);
            }
            "enditem" => {
                let item = std::mem::take(&mut self.item);
                self.order().items.push(item);
            }
            "endorder" => {
                let order = self.current.take().unwrap_or_default();
                info!(
                    id = %order.id,
                    items = order.items.len(),
                    total = %order.total(),
                    "Remote order received"
                );
                if self.sink.send(order).is_err() {
                    warn!("Order receiver dropped, ending session");
                    return Ok(Flow::Done);
                }
            }
            _ => debug!(key = %record.key, "Ignoring unknown order key"),
        }
        Ok(Flow::Continue)
    }

    fn on_close(&mut self) {
        if let Some(order) = self.current.take() {
            warn!(id = %order.id, "Session closed with an unfinished order");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(
        collector: &mut OrderCollector,
        pairs: &[(&str, &str)],
    ) -> PosResult<()> {
        for (k, v) in pairs {
            collector.on_record(&KeyValue::new(*k, *v))?;
        }
        Ok(())
    }

    /// Тест проверяет сборку заказа из двух позиций.
    #[test]
    fn test_collects_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = OrderCollector::new(tx);
        feed(
            &mut c,
            &[
                ("OrderID", "A17"),
                ("Item", "Soup"),
                ("Qty", "2"),
                ("Price", "4.50"),
                ("EndItem", ""),
                ("Item", "Tea"),
                ("Qty", "1"),
                ("Price", "1.25"),
                ("Color", "blue"),
                ("EndItem", ""),
                ("EndOrder", ""),
            ],
        )
        .unwrap();

        let order = rx.try_recv().unwrap();
        assert_eq!(order.id, "A17");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total(), Money::from_cents(1025));
    }

    #[test]
    fn test_bad_quantity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c = OrderCollector::new(tx);
        let err = feed(&mut c, &[("Qty", "many")]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SidecarError>(),
            Some(SidecarError::Handler { .. })
        ));
    }
}
