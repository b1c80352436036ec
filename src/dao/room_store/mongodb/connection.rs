use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 10;
const PING_INITIAL_DELAY: Duration = Duration::from_millis(250);
const PING_MAX_DELAY: Duration = Duration::from_secs(5);

/// Construct a client and wait until the server answers a ping, backing off
/// exponentially between attempts.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delay = PING_INITIAL_DELAY;
    for attempt in 1..=PING_ATTEMPTS {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(err) if attempt == PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                debug!(attempt, error = %err, "initial MongoDB ping failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(PING_MAX_DELAY);
            }
        }
    }

    unreachable!("the ping loop either returns a connection or the last error")
}
