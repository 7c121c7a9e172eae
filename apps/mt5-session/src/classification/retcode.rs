//! MT5 trade return codes.
//!
//! Every documented `TRADE_RETCODE_*` value, grouped the way the venue
//! documentation groups them. The group decides the classification:
//!
//! | Group | Classification |
//! |-------|----------------|
//! | Success | `Success` (only `10009` satisfies [`is_retcode_success`]) |
//! | Requote | `Requote` |
//! | Rejection | `Fatal` |
//! | Restriction | `PermissionDenied` |
//! | ResourceLimit | `ResourceExhausted` |
//! | Technical | `Retryable`, except `10011` which is `Fatal` |
//! | State | `Fatal` |
//!
//! [`is_retcode_success`]: super::is_retcode_success

use std::fmt;
use std::time::Duration;

use super::ClassificationKind;

/// Return-code family as documented by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetcodeGroup {
    /// Request executed.
    Success,
    /// Price moved before execution.
    Requote,
    /// Request rejected as invalid.
    Rejection,
    /// Trading is not permitted for this account, symbol, or direction.
    Restriction,
    /// Account or server limit reached.
    ResourceLimit,
    /// Transient technical condition on the trade server.
    Technical,
    /// Order, position, or market state prevents the request.
    State,
}

impl RetcodeGroup {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Requote => "requote",
            Self::Rejection => "rejection",
            Self::Restriction => "restriction",
            Self::ResourceLimit => "resource_limit",
            Self::Technical => "technical",
            Self::State => "state",
        }
    }
}

/// A known MT5 trade return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TradeRetcode {
    /// Requote.
    Requote = 10004,
    /// Request rejected.
    Reject = 10006,
    /// Request canceled by trader.
    Cancel = 10007,
    /// Order placed.
    Placed = 10008,
    /// Request completed.
    Done = 10009,
    /// Only part of the request was completed.
    DonePartial = 10010,
    /// Request processing error.
    Error = 10011,
    /// Request canceled by timeout.
    Timeout = 10012,
    /// Invalid request.
    Invalid = 10013,
    /// Invalid volume in the request.
    InvalidVolume = 10014,
    /// Invalid price in the request.
    InvalidPrice = 10015,
    /// Invalid stops in the request.
    InvalidStops = 10016,
    /// Trade is disabled.
    TradeDisabled = 10017,
    /// Market is closed.
    MarketClosed = 10018,
    /// Not enough money to complete the request.
    NoMoney = 10019,
    /// Prices changed.
    PriceChanged = 10020,
    /// No quotes to process the request.
    PriceOff = 10021,
    /// Invalid order expiration date.
    InvalidExpiration = 10022,
    /// Order state changed.
    OrderChanged = 10023,
    /// Too frequent requests.
    TooManyRequests = 10024,
    /// No changes in request.
    NoChanges = 10025,
    /// Autotrading disabled by server.
    ServerDisablesAutoTrading = 10026,
    /// Autotrading disabled by client terminal.
    ClientDisablesAutoTrading = 10027,
    /// Request locked for processing.
    Locked = 10028,
    /// Order or position frozen.
    Frozen = 10029,
    /// Invalid order filling type.
    InvalidFill = 10030,
    /// No connection with the trade server.
    Connection = 10031,
    /// Operation is allowed only for live accounts.
    OnlyReal = 10032,
    /// The number of pending orders has reached the limit.
    LimitOrders = 10033,
    /// The volume of orders and positions for the symbol has reached the limit.
    LimitVolume = 10034,
    /// Incorrect or prohibited order type.
    InvalidOrder = 10035,
    /// Position with the specified identifier has already been closed.
    PositionClosed = 10036,
    /// A close volume exceeds the current position volume.
    InvalidCloseVolume = 10038,
    /// A close order already exists for the position.
    CloseOrderExist = 10039,
    /// The number of open positions has reached the limit.
    LimitPositions = 10040,
    /// The pending order activation request is rejected, the order is canceled.
    RejectCancel = 10041,
    /// Only long positions are allowed.
    LongOnly = 10042,
    /// Only short positions are allowed.
    ShortOnly = 10043,
    /// Only position closing is allowed.
    CloseOnly = 10044,
    /// Position closing is allowed only by FIFO rule.
    FifoClose = 10045,
    /// Opposite positions on a single symbol are disabled.
    HedgeProhibited = 10046,
}

impl TradeRetcode {
    /// Every known return code in ascending numeric order.
    pub const ALL: [Self; 41] = [
        Self::Requote,
        Self::Reject,
        Self::Cancel,
        Self::Placed,
        Self::Done,
        Self::DonePartial,
        Self::Error,
        Self::Timeout,
        Self::Invalid,
        Self::InvalidVolume,
        Self::InvalidPrice,
        Self::InvalidStops,
        Self::TradeDisabled,
        Self::MarketClosed,
        Self::NoMoney,
        Self::PriceChanged,
        Self::PriceOff,
        Self::InvalidExpiration,
        Self::OrderChanged,
        Self::TooManyRequests,
        Self::NoChanges,
        Self::ServerDisablesAutoTrading,
        Self::ClientDisablesAutoTrading,
        Self::Locked,
        Self::Frozen,
        Self::InvalidFill,
        Self::Connection,
        Self::OnlyReal,
        Self::LimitOrders,
        Self::LimitVolume,
        Self::InvalidOrder,
        Self::PositionClosed,
        Self::InvalidCloseVolume,
        Self::CloseOrderExist,
        Self::LimitPositions,
        Self::RejectCancel,
        Self::LongOnly,
        Self::ShortOnly,
        Self::CloseOnly,
        Self::FifoClose,
        Self::HedgeProhibited,
    ];

    /// Look up a raw return code. Returns `None` for codes the venue does not document.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|retcode| retcode.code() == code)
    }

    /// Numeric value as sent by the trade server.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Symbolic name, e.g. `TRADE_RETCODE_REQUOTE`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Requote => "TRADE_RETCODE_REQUOTE",
            Self::Reject => "TRADE_RETCODE_REJECT",
            Self::Cancel => "TRADE_RETCODE_CANCEL",
            Self::Placed => "TRADE_RETCODE_PLACED",
            Self::Done => "TRADE_RETCODE_DONE",
            Self::DonePartial => "TRADE_RETCODE_DONE_PARTIAL",
            Self::Error => "TRADE_RETCODE_ERROR",
            Self::Timeout => "TRADE_RETCODE_TIMEOUT",
            Self::Invalid => "TRADE_RETCODE_INVALID",
            Self::InvalidVolume => "TRADE_RETCODE_INVALID_VOLUME",
            Self::InvalidPrice => "TRADE_RETCODE_INVALID_PRICE",
            Self::InvalidStops => "TRADE_RETCODE_INVALID_STOPS",
            Self::TradeDisabled => "TRADE_RETCODE_TRADE_DISABLED",
            Self::MarketClosed => "TRADE_RETCODE_MARKET_CLOSED",
            Self::NoMoney => "TRADE_RETCODE_NO_MONEY",
            Self::PriceChanged => "TRADE_RETCODE_PRICE_CHANGED",
            Self::PriceOff => "TRADE_RETCODE_PRICE_OFF",
            Self::InvalidExpiration => "TRADE_RETCODE_INVALID_EXPIRATION",
            Self::OrderChanged => "TRADE_RETCODE_ORDER_CHANGED",
            Self::TooManyRequests => "TRADE_RETCODE_TOO_MANY_REQUESTS",
            Self::NoChanges => "TRADE_RETCODE_NO_CHANGES",
            Self::ServerDisablesAutoTrading => "TRADE_RETCODE_SERVER_DISABLES_AT",
            Self::ClientDisablesAutoTrading => "TRADE_RETCODE_CLIENT_DISABLES_AT",
            Self::Locked => "TRADE_RETCODE_LOCKED",
            Self::Frozen => "TRADE_RETCODE_FROZEN",
            Self::InvalidFill => "TRADE_RETCODE_INVALID_FILL",
            Self::Connection => "TRADE_RETCODE_CONNECTION",
            Self::OnlyReal => "TRADE_RETCODE_ONLY_REAL",
            Self::LimitOrders => "TRADE_RETCODE_LIMIT_ORDERS",
            Self::LimitVolume => "TRADE_RETCODE_LIMIT_VOLUME",
            Self::InvalidOrder => "TRADE_RETCODE_INVALID_ORDER",
            Self::PositionClosed => "TRADE_RETCODE_POSITION_CLOSED",
            Self::InvalidCloseVolume => "TRADE_RETCODE_INVALID_CLOSE_VOLUME",
            Self::CloseOrderExist => "TRADE_RETCODE_CLOSE_ORDER_EXIST",
            Self::LimitPositions => "TRADE_RETCODE_LIMIT_POSITIONS",
            Self::RejectCancel => "TRADE_RETCODE_REJECT_CANCEL",
            Self::LongOnly => "TRADE_RETCODE_LONG_ONLY",
            Self::ShortOnly => "TRADE_RETCODE_SHORT_ONLY",
            Self::CloseOnly => "TRADE_RETCODE_CLOSE_ONLY",
            Self::FifoClose => "TRADE_RETCODE_FIFO_CLOSE",
            Self::HedgeProhibited => "TRADE_RETCODE_HEDGE_PROHIBITED",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Requote => "Requote",
            Self::Reject => "Request rejected",
            Self::Cancel => "Request canceled by trader",
            Self::Placed => "Order placed",
            Self::Done => "Request completed",
            Self::DonePartial => "Only part of the request was completed",
            Self::Error => "Request processing error",
            Self::Timeout => "Request canceled by timeout",
            Self::Invalid => "Invalid request",
            Self::InvalidVolume => "Invalid volume in the request",
            Self::InvalidPrice => "Invalid price in the request",
            Self::InvalidStops => "Invalid stops in the request",
            Self::TradeDisabled => "Trade is disabled",
            Self::MarketClosed => "Market is closed",
            Self::NoMoney => "There is not enough money to complete the request",
            Self::PriceChanged => "Prices changed",
            Self::PriceOff => "There are no quotes to process the request",
            Self::InvalidExpiration => "Invalid order expiration date in the request",
            Self::OrderChanged => "Order state changed",
            Self::TooManyRequests => "Too frequent requests",
            Self::NoChanges => "No changes in request",
            Self::ServerDisablesAutoTrading => "Autotrading disabled by server",
            Self::ClientDisablesAutoTrading => "Autotrading disabled by client terminal",
            Self::Locked => "Request locked for processing",
            Self::Frozen => "Order or position frozen",
            Self::InvalidFill => "Invalid order filling type",
            Self::Connection => "No connection with the trade server",
            Self::OnlyReal => "Operation is allowed only for live accounts",
            Self::LimitOrders => "The number of pending orders has reached the limit",
            Self::LimitVolume => {
                "The volume of orders and positions for the symbol has reached the limit"
            }
            Self::InvalidOrder => "Incorrect or prohibited order type",
            Self::PositionClosed => "Position with the specified identifier has already been closed",
            Self::InvalidCloseVolume => "A close volume exceeds the current position volume",
            Self::CloseOrderExist => "A close order already exists for the specified position",
            Self::LimitPositions => "The number of open positions has reached the limit",
            Self::RejectCancel => "The pending order activation request is rejected",
            Self::LongOnly => "Only long positions are allowed for this symbol",
            Self::ShortOnly => "Only short positions are allowed for this symbol",
            Self::CloseOnly => "Only position closing is allowed for this symbol",
            Self::FifoClose => "Position closing is allowed only by FIFO rule",
            Self::HedgeProhibited => "Opposite positions on a single symbol are disabled",
        }
    }

    /// Documented family of this code.
    #[must_use]
    pub const fn group(self) -> RetcodeGroup {
        match self {
            Self::Done | Self::DonePartial => RetcodeGroup::Success,
            Self::Requote | Self::PriceChanged => RetcodeGroup::Requote,
            Self::Reject
            | Self::Invalid
            | Self::InvalidVolume
            | Self::InvalidPrice
            | Self::InvalidStops
            | Self::InvalidExpiration
            | Self::InvalidFill
            | Self::InvalidOrder
            | Self::InvalidCloseVolume => RetcodeGroup::Rejection,
            Self::TradeDisabled
            | Self::ServerDisablesAutoTrading
            | Self::ClientDisablesAutoTrading
            | Self::OnlyReal
            | Self::LongOnly
            | Self::ShortOnly
            | Self::CloseOnly
            | Self::FifoClose
            | Self::HedgeProhibited => RetcodeGroup::Restriction,
            Self::NoMoney | Self::LimitOrders | Self::LimitVolume | Self::LimitPositions => {
                RetcodeGroup::ResourceLimit
            }
            Self::Error
            | Self::Timeout
            | Self::PriceOff
            | Self::TooManyRequests
            | Self::Locked
            | Self::Frozen
            | Self::Connection => RetcodeGroup::Technical,
            Self::Cancel
            | Self::Placed
            | Self::MarketClosed
            | Self::OrderChanged
            | Self::NoChanges
            | Self::PositionClosed
            | Self::CloseOrderExist
            | Self::RejectCancel => RetcodeGroup::State,
        }
    }

    /// Classification kind for this code.
    #[must_use]
    pub const fn kind(self) -> ClassificationKind {
        match self.group() {
            RetcodeGroup::Success => ClassificationKind::Success,
            RetcodeGroup::Requote => ClassificationKind::Requote,
            RetcodeGroup::Restriction => ClassificationKind::PermissionDenied,
            RetcodeGroup::ResourceLimit => ClassificationKind::ResourceExhausted,
            // 10011 is a processing error with no statement about whether the
            // request ran, so it is not safe to re-issue.
            RetcodeGroup::Technical if !matches!(self, Self::Error) => {
                ClassificationKind::Retryable
            }
            RetcodeGroup::Technical | RetcodeGroup::Rejection | RetcodeGroup::State => {
                ClassificationKind::Fatal
            }
        }
    }

    /// Minimum wait the venue implies before trying again.
    #[must_use]
    pub const fn wait_hint(self) -> Option<Duration> {
        match self {
            Self::TooManyRequests => Some(Duration::from_secs(1)),
            Self::Locked | Self::Frozen => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

impl fmt::Display for TradeRetcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
