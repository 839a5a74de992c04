pub mod announcement;
pub mod booking;
pub mod coupon;
pub mod court;
pub mod user;

pub use announcement::{Announcement, AnnouncementPatch, NewAnnouncement};
pub use booking::{ApproveBooking, Booking, BookingPatch, BookingStatus, NewBooking, PaymentState};
pub use coupon::{ApplyCoupon, Coupon, CouponPatch, CouponQuote, NewCoupon};
pub use court::{Court, CourtPatch};
pub use user::{normalize_email, GoogleSignIn, NewUser, Role, RoleChange, User, UserPatch};
