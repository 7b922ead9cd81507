//! AMQP (`RabbitMQ`) adapter for the message bus port.

mod bus;

pub use bus::AmqpMessageBus;
