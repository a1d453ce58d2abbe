use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

/// Closed set of job kinds a queue dispatches on.
///
/// Kinds are persisted through `Display` and read back through `FromStr`, so a
/// record written by a newer producer with a kind this worker does not know
/// fails to parse and is abandoned instead of crashing the loop.
pub trait JobKind:
    Copy + Eq + Hash + Debug + Display + FromStr + Send + Sync + 'static
{
    /// Every variant; the handler registry checks each one is covered
    fn all() -> Vec<Self>;
}
