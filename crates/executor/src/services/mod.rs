pub mod channel_listener;
pub mod dispatcher;
pub mod execution_service;
pub mod subscription_feed;
pub mod telegram_service;
