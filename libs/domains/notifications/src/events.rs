//! Domain event fan-out.
//!
//! Order, delivery, and payment flows publish [`DomainEvent`]s;
//! [`NotificationFanout`] maps each event to the notification requests it
//! implies and enqueues them through the dispatcher. Status-change events
//! fan out only on an actual transition.

use crate::dispatch::NotificationDispatcher;
use crate::error::NotificationResult;
use crate::models::{NotificationRequest, NotificationType};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Confirmed,
    Processing,
    OutForDelivery,
    Delivered,
    Cancelled,
    FailedDelivery,
}

/// Delivery lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStage {
    PendingPickup,
    PickedUp,
    OnTheWay,
    Delivered,
    Failed,
}

/// A farmer's share of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmerShare {
    pub farmer_id: Uuid,
    pub amount: f64,
}

/// Events published by the marketplace flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        total_amount: f64,
        farmer_shares: Vec<FarmerShare>,
        admin_ids: Vec<Uuid>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        admin_ids: Vec<Uuid>,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    DeliveryStatusChanged {
        delivery_id: Uuid,
        order_number: String,
        rider_id: Uuid,
        admin_ids: Vec<Uuid>,
        old_stage: DeliveryStage,
        new_stage: DeliveryStage,
    },
    RiderAssigned {
        delivery_id: Uuid,
        order_number: String,
        rider_id: Uuid,
        admin_ids: Vec<Uuid>,
        order_value: f64,
        delivery_location: String,
        reassigned: bool,
    },
    PaymentReceived {
        order_id: Uuid,
        order_number: String,
        customer_id: Uuid,
        amount: f64,
    },
}

/// Customer-facing message for a status an order can move into.
///
/// Statuses without a customer message (payment pending, failed delivery)
/// return `None` and produce no customer notification.
fn order_status_message(status: OrderStatus) -> Option<&'static str> {
    match status {
        OrderStatus::Confirmed => Some("Your order has been confirmed and is being prepared."),
        OrderStatus::Processing => Some("Your order is being processed by our farmers."),
        OrderStatus::OutForDelivery => Some("Your order is out for delivery."),
        OrderStatus::Delivered => Some("Your order has been delivered successfully."),
        OrderStatus::Cancelled => Some("Your order has been cancelled."),
        OrderStatus::PendingPayment | OrderStatus::FailedDelivery => None,
    }
}

/// Maps domain events onto the dispatch façade.
#[derive(Clone)]
pub struct NotificationFanout {
    dispatcher: NotificationDispatcher,
}

impl NotificationFanout {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Enqueue every notification the event implies.
    ///
    /// Returns the request IDs that were enqueued. Status-change events
    /// where nothing actually changed enqueue nothing.
    pub async fn publish(&self, event: DomainEvent) -> NotificationResult<Vec<Uuid>> {
        let requests = Self::requests_for(event);

        let mut request_ids = Vec::with_capacity(requests.len());
        for request in requests {
            request_ids.push(self.dispatcher.enqueue(request).await?);
        }

        debug!(count = request_ids.len(), "Fanned out domain event");
        Ok(request_ids)
    }

    /// Build the notification requests an event implies.
    pub fn requests_for(event: DomainEvent) -> Vec<NotificationRequest> {
        match event {
            DomainEvent::OrderCreated {
                order_id,
                order_number,
                customer_id,
                total_amount,
                farmer_shares,
                admin_ids,
            } => {
                let mut requests = vec![
                    NotificationRequest::new(
                        customer_id,
                        NotificationType::OrderUpdate,
                        format!("Order Confirmed #{}", order_number),
                        format!(
                            "Your order for KES {:.2} has been confirmed and is being processed.",
                            total_amount
                        ),
                    )
                    .with_sms()
                    .with_related_id(order_id),
                ];

                for share in farmer_shares {
                    requests.push(
                        NotificationRequest::new(
                            share.farmer_id,
                            NotificationType::OrderUpdate,
                            format!("New Order Received #{}", order_number),
                            format!(
                                "You have received a new order worth KES {:.2}. \
                                 Please prepare the items for delivery.",
                                share.amount
                            ),
                        )
                        .with_sms()
                        .with_related_id(order_id),
                    );
                }

                for admin_id in admin_ids {
                    requests.push(
                        NotificationRequest::new(
                            admin_id,
                            NotificationType::SystemMessage,
                            format!("New Order #{}", order_number),
                            format!(
                                "Order #{} was placed for KES {:.2}.",
                                order_number, total_amount
                            ),
                        )
                        .with_sms()
                        .with_related_id(order_id),
                    );
                }

                requests
            }

            DomainEvent::OrderStatusChanged {
                order_id,
                order_number,
                customer_id,
                admin_ids,
                old_status,
                new_status,
            } => {
                if old_status == new_status {
                    return Vec::new();
                }

                let mut requests = Vec::new();

                if let Some(message) = order_status_message(new_status) {
                    requests.push(
                        NotificationRequest::new(
                            customer_id,
                            NotificationType::OrderUpdate,
                            format!("Order Update #{}", order_number),
                            message,
                        )
                        .with_sms()
                        .with_related_id(order_id),
                    );
                }

                // Admins only care about terminal states
                if matches!(new_status, OrderStatus::Delivered | OrderStatus::Cancelled) {
                    for admin_id in admin_ids {
                        requests.push(
                            NotificationRequest::new(
                                admin_id,
                                NotificationType::SystemMessage,
                                format!("Order Update #{}", order_number),
                                format!("Order #{} is now {}.", order_number, new_status),
                            )
                            .with_sms()
                            .with_related_id(order_id),
                        );
                    }
                }

                requests
            }

            DomainEvent::DeliveryStatusChanged {
                delivery_id,
                order_number,
                rider_id,
                admin_ids,
                old_stage,
                new_stage,
            } => {
                if old_stage == new_stage {
                    return Vec::new();
                }

                let body = format!(
                    "Delivery for Order #{} is now {}.",
                    order_number, new_stage
                );

                let mut requests = vec![
                    NotificationRequest::new(
                        rider_id,
                        NotificationType::OrderUpdate,
                        format!("Delivery Update #{}", order_number),
                        body.clone(),
                    )
                    .with_sms()
                    .with_related_id(delivery_id),
                ];

                for admin_id in admin_ids {
                    requests.push(
                        NotificationRequest::new(
                            admin_id,
                            NotificationType::SystemMessage,
                            format!("Delivery Update #{}", order_number),
                            body.clone(),
                        )
                        .with_sms()
                        .with_related_id(delivery_id),
                    );
                }

                requests
            }

            DomainEvent::RiderAssigned {
                delivery_id,
                order_number,
                rider_id,
                admin_ids,
                order_value,
                delivery_location,
                reassigned,
            } => {
                let action = if reassigned { "reassigned" } else { "assigned" };

                let mut requests = vec![
                    NotificationRequest::new(
                        rider_id,
                        NotificationType::OrderUpdate,
                        format!("Delivery Assignment #{}", delivery_id),
                        format!(
                            "You have been {} to deliver Order #{}. Total value: KES {:.2}. \
                             Please check your delivery dashboard for details. Delivery to: {}",
                            action, order_number, order_value, delivery_location
                        ),
                    )
                    .with_sms()
                    .with_related_id(delivery_id),
                ];

                for admin_id in admin_ids {
                    requests.push(
                        NotificationRequest::new(
                            admin_id,
                            NotificationType::SystemMessage,
                            format!("Delivery Assignment #{}", delivery_id),
                            format!("A rider was {} to deliver Order #{}.", action, order_number),
                        )
                        .with_sms()
                        .with_related_id(delivery_id),
                    );
                }

                requests
            }

            DomainEvent::PaymentReceived {
                order_id,
                order_number,
                customer_id,
                amount,
            } => vec![
                NotificationRequest::new(
                    customer_id,
                    NotificationType::PaymentReceived,
                    format!("Payment Received #{}", order_number),
                    format!(
                        "Your payment of KES {:.2} for Order #{} has been received.",
                        amount, order_number
                    ),
                )
                .with_sms()
                .with_related_id(order_id),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins() -> Vec<Uuid> {
        vec![Uuid::new_v4(), Uuid::new_v4()]
    }

    #[test]
    fn test_order_created_fans_out_to_all_parties() {
        let customer_id = Uuid::new_v4();
        let farmer_id = Uuid::new_v4();
        let admin_ids = admins();

        let requests = NotificationFanout::requests_for(DomainEvent::OrderCreated {
            order_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            customer_id,
            total_amount: 1500.0,
            farmer_shares: vec![FarmerShare {
                farmer_id,
                amount: 900.0,
            }],
            admin_ids: admin_ids.clone(),
        });

        assert_eq!(requests.len(), 4);

        let customer = &requests[0];
        assert_eq!(customer.user_id, customer_id);
        assert_eq!(customer.title, "Order Confirmed #1001");
        assert_eq!(
            customer.body,
            "Your order for KES 1500.00 has been confirmed and is being processed."
        );
        assert!(customer.sms_requested);

        let farmer = &requests[1];
        assert_eq!(farmer.user_id, farmer_id);
        assert_eq!(farmer.title, "New Order Received #1001");
        assert!(farmer.body.contains("KES 900.00"));

        assert!(requests[2..]
            .iter()
            .all(|r| r.notification_type == NotificationType::SystemMessage));
    }

    #[test]
    fn test_status_change_noop_when_unchanged() {
        let requests = NotificationFanout::requests_for(DomainEvent::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            customer_id: Uuid::new_v4(),
            admin_ids: admins(),
            old_status: OrderStatus::Processing,
            new_status: OrderStatus::Processing,
        });

        assert!(requests.is_empty());
    }

    #[test]
    fn test_status_change_message_table() {
        let customer_id = Uuid::new_v4();
        let requests = NotificationFanout::requests_for(DomainEvent::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            customer_id,
            admin_ids: vec![],
            old_status: OrderStatus::Processing,
            new_status: OrderStatus::OutForDelivery,
        });

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].title, "Order Update #1001");
        assert_eq!(requests[0].body, "Your order is out for delivery.");
    }

    #[test]
    fn test_admins_notified_on_terminal_states_only() {
        let event = |new_status| DomainEvent::OrderStatusChanged {
            order_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            customer_id: Uuid::new_v4(),
            admin_ids: admins(),
            old_status: OrderStatus::Processing,
            new_status,
        };

        let requests = NotificationFanout::requests_for(event(OrderStatus::OutForDelivery));
        assert_eq!(requests.len(), 1);

        let requests = NotificationFanout::requests_for(event(OrderStatus::Cancelled));
        assert_eq!(requests.len(), 3);
    }

    #[test]
    fn test_rider_assignment_message() {
        let rider_id = Uuid::new_v4();
        let delivery_id = Uuid::new_v4();

        let requests = NotificationFanout::requests_for(DomainEvent::RiderAssigned {
            delivery_id,
            order_number: "1001".to_string(),
            rider_id,
            admin_ids: vec![],
            order_value: 2500.0,
            delivery_location: "Westlands".to_string(),
            reassigned: false,
        });

        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].title,
            format!("Delivery Assignment #{}", delivery_id)
        );
        assert_eq!(
            requests[0].body,
            "You have been assigned to deliver Order #1001. Total value: KES 2500.00. \
             Please check your delivery dashboard for details. Delivery to: Westlands"
        );
        assert_eq!(requests[0].related_id, Some(delivery_id));
    }

    #[test]
    fn test_reassignment_wording() {
        let requests = NotificationFanout::requests_for(DomainEvent::RiderAssigned {
            delivery_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            rider_id: Uuid::new_v4(),
            admin_ids: vec![],
            order_value: 100.0,
            delivery_location: "Kilimani".to_string(),
            reassigned: true,
        });

        assert!(requests[0].body.starts_with("You have been reassigned"));
    }

    #[test]
    fn test_payment_received_targets_customer_only() {
        let customer_id = Uuid::new_v4();
        let requests = NotificationFanout::requests_for(DomainEvent::PaymentReceived {
            order_id: Uuid::new_v4(),
            order_number: "1001".to_string(),
            customer_id,
            amount: 750.5,
        });

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_id, customer_id);
        assert_eq!(
            requests[0].notification_type,
            NotificationType::PaymentReceived
        );
        assert!(requests[0].body.contains("KES 750.50"));
    }
}
