//! Chat input parsing.
//!
//! Slash commands, button callbacks and the legacy spellings of both collapse
//! into one [`Action`]; nothing past this module sees the raw strings.

use crate::domain::order::{MediaRef, OrderId, OrderStatus, PremiumPeriod};
use crate::domain::ports::OrderFilter;
use crate::domain::session::FlowStart;
use crate::error::{Result, ShopError};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// First contact or a return to the bot.
    Start { display_name: String },
    /// Back to the main menu, dropping any flow in progress.
    MainMenu,
    Begin(FlowStart),
    Text(String),
    Photo(MediaRef),

    PayByCard(OrderId),
    PayByCrypto(OrderId),
    /// "I paid": the next photo is the card transfer screenshot.
    CardPaid(OrderId),
    CheckCrypto(OrderId),
    CancelUpload(OrderId),

    Inspect(OrderId),
    Confirm(OrderId),
    Reject(OrderId),
    Complete(OrderId),
    Cancel(OrderId),
    InvoiceStatus(OrderId),
    List(OrderFilter),
    Statistics,
}

impl Action {
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Action::Inspect(_)
                | Action::Confirm(_)
                | Action::Reject(_)
                | Action::Complete(_)
                | Action::Cancel(_)
                | Action::InvoiceStatus(_)
                | Action::List(_)
                | Action::Statistics
        )
    }

    /// Parses a text message. Anything that is not a slash command is free
    /// text for the session tracker.
    pub fn parse_text(text: &str) -> Result<Action> {
        let trimmed = text.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(Action::Text(text.to_string()));
        };

        let (head, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(head, rest)| (head, rest.trim()));
        // Group chats append the bot name: /check@shop_bot
        let head = head.split_once('@').map_or(head, |(verb, _)| verb);
        // Legacy spelling carries the argument inline: /check_12
        let (verb, inline) = head.split_once('_').unwrap_or((head, ""));
        let arg = if inline.is_empty() { rest } else { inline };

        let order_id = || -> Result<OrderId> {
            if arg.is_empty() {
                return Err(ShopError::ValidationError(format!(
                    "Usage: /{verb} <order number>"
                )));
            }
            arg.parse()
        };

        match verb {
            "start" => Ok(Action::Start {
                display_name: String::new(),
            }),
            "check" => Ok(Action::Inspect(order_id()?)),
            "confirm" => Ok(Action::Confirm(order_id()?)),
            "complete" => Ok(Action::Complete(order_id()?)),
            "cancel" => Ok(Action::Cancel(order_id()?)),
            "reject" => Ok(Action::Reject(order_id()?)),
            "admin" => Ok(Action::Statistics),
            "orders" => Ok(Action::List(OrderFilter::Active)),
            other => Err(ShopError::ValidationError(format!(
                "Unknown command: /{other}"
            ))),
        }
    }

    /// Parses button callback data.
    pub fn parse_callback(data: &str) -> Result<Action> {
        let data = data.trim();
        let fixed = match data {
            "buy_stars" => Some(Action::Begin(FlowStart::Stars)),
            "exchange" => Some(Action::Begin(FlowStart::Exchange)),
            "main_menu" | "buy_premium" | "info" => Some(Action::MainMenu),
            "admin_stats" | "admin_back" => Some(Action::Statistics),
            "admin_orders" => Some(Action::List(OrderFilter::Active)),
            "admin_pending" | "orders_pending" => {
                Some(Action::List(OrderFilter::Status(OrderStatus::Pending)))
            }
            "admin_completed" => Some(Action::List(OrderFilter::Status(OrderStatus::Completed))),
            "orders_all" => Some(Action::List(OrderFilter::All)),
            "orders_waiting" => Some(Action::List(OrderFilter::Status(
                OrderStatus::WaitingPayment,
            ))),
            "orders_confirmation" => Some(Action::List(OrderFilter::Status(
                OrderStatus::WaitingConfirmation,
            ))),
            "orders_crypto" => Some(Action::List(OrderFilter::Status(
                OrderStatus::WaitingCrypto,
            ))),
            _ => None,
        };
        if let Some(action) = fixed {
            return Ok(action);
        }
        if let Some(key) = data.strip_prefix("premium_") {
            return Ok(Action::Begin(FlowStart::Premium(key.parse::<PremiumPeriod>()?)));
        }

        let unknown = || ShopError::ValidationError(format!("Unknown callback: {data:?}"));
        let (prefix, id) = data.rsplit_once('_').ok_or_else(unknown)?;
        let id: OrderId = id.parse()?;
        match prefix {
            "card_pay" => Ok(Action::PayByCard(id)),
            "crypto_pay" => Ok(Action::PayByCrypto(id)),
            "confirm_paid" => Ok(Action::CardPaid(id)),
            "check_crypto" => Ok(Action::CheckCrypto(id)),
            "cancel_photo" => Ok(Action::CancelUpload(id)),
            "order_refresh" | "order_msg" => Ok(Action::Inspect(id)),
            // The older button confirmed after re-checking the invoice.
            "order_confirm" | "order_complete" => Ok(Action::Confirm(id)),
            "order_finish" => Ok(Action::Complete(id)),
            "order_reject" => Ok(Action::Reject(id)),
            "order_cancel" => Ok(Action::Cancel(id)),
            "crypto_status" => Ok(Action::InvoiceStatus(id)),
            _ => Err(unknown()),
        }
    }
}
