pub mod cart;
pub mod event;
pub mod item;
pub mod order;
pub mod quota;
pub mod seat;
pub mod voucher;

pub use cart::CartPosition;
pub use event::{Event, Organizer, SubEvent};
pub use item::{Item, ItemVariation, TaxRule};
pub use order::{
    FeeType, InvoiceAddress, Order, OrderFee, OrderPayment, OrderPosition, OrderStatus,
    PaymentState,
};
pub use quota::{Availability, AvailabilityState, Quota};
pub use seat::Seat;
pub use voucher::{Voucher, VoucherPriceMode};
