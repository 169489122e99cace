use std::collections::BTreeMap;

use log::info;
use thousands::Separable;

pub use log::debug;

/// Debug message which can be switched on for one code block without the global --debug flag
///
/// With the local flag set, the message goes straight to stderr. Otherwise it is a regular debug
/// log message.
///
macro_rules! debug_msg {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            eprintln!($($arg)+);
        } else {
            $crate::log_utils::debug!($($arg)+);
        }
    }
}

pub(crate) use debug_msg;

/// Log one line per category with its sample or pair count, in category order
///
/// # Arguments
/// * `label` - Describes the counted items with the category appended, e.g. "Samples with sex
///   karyotype"
///
pub fn log_category_counts<K: std::fmt::Display>(label: &str, counts: &BTreeMap<K, usize>) {
    for (category, count) in counts.iter() {
        info!("{label} {category}: {}", count.separate_with_commas());
    }
}
