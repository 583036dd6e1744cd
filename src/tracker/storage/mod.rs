//!  Storage is organized through [partition_storage::CsvLogStorage].
//!  The basic idea is:
//!   - There is a directory with all the partitions.
//!   - Each partition is a CSV file holding the rows of one local calendar day.
//!   - Rows mark transitions only, how long something lasted is the distance to the next row.

pub mod entities;
pub mod partition_storage;
