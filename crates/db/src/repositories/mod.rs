mod locker_state_repo;
mod unlock_grant_repo;

pub use locker_state_repo::LockerStateRepo;
pub use unlock_grant_repo::UnlockGrantRepo;
