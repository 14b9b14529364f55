use log::debug;

use super::{Connector, DeviceSession, DeviceTarget};
use crate::dialect::{DIALECT_ORDER, Dialect};
use crate::error::SweepError;

/// Tries each supported dialect in priority order until one opens a
/// privileged session against the target.
///
/// The first successful dialect wins and no further dialect is tried, even
/// if a later one might also match. Failed attempts are logged and
/// discarded; the connector guarantees each failed attempt released its
/// own resources before the next one opens.
///
/// Returns [`SweepError::DetectionFailed`] when every dialect is exhausted.
pub async fn detect(
    connector: &dyn Connector,
    target: &DeviceTarget,
) -> Result<(Box<dyn DeviceSession>, Dialect), SweepError> {
    for dialect in DIALECT_ORDER {
        debug!("{}: trying dialect {}", target.address, dialect);
        match connector.open(*dialect, target).await {
            Ok(session) => {
                debug!("{}: matched dialect {}", target.address, dialect);
                return Ok((session, *dialect));
            }
            Err(err) => {
                // Swallowed intentionally: the public contract is one
                // summary error after exhaustion.
                debug!("{}: dialect {} failed: {}", target.address, dialect, err);
            }
        }
    }

    Err(SweepError::DetectionFailed(target.address.clone()))
}
