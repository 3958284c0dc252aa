pub mod locker_state;
pub mod unlock_grant;
