//! Data models for the circulation service

pub mod borrower;
pub mod branch;
pub mod copy;
pub mod enums;
pub mod loan;
pub mod report;
pub mod reservation;
pub mod title;

// Re-export commonly used types
pub use borrower::{Actor, Borrower};
pub use branch::{Branch, BranchAvailability, BranchInventory, TitleInventory};
pub use copy::BookCopy;
pub use enums::{CopyStatus, LoanStatus, ReservationStatus, Role};
pub use loan::{Loan, NewLoan};
pub use report::{
    BorrowerFine, BorrowerSummary, CirculationStats, OverdueLoan, OverdueReport, PopularTitle,
};
pub use reservation::{NewReservation, Removal, Reservation, ReservationQueue};
pub use title::Title;
