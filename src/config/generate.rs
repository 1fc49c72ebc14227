pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# AMPLITUDE IMPORTER CONFIGURATION
# =============================================================================
# Every key is optional. Omitted keys fall back to the defaults shown here.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/amplitude-importer/config.yml
#   3. /etc/amplitude-importer/config.yml
#
# Values may reference environment variables with $env{VAR_NAME}.
#
# The API key is never read from this file. Export it instead:
#   export API_KEY=your-project-api-key

# Batch ingestion endpoint (EU residency by default)
endpoint: https://api.eu.amplitude.com/batch

# Events per HTTP request
batch_size: 1000

# Maximum number of uploads in flight at once. When every slot is busy the
# file reader waits, so memory stays bounded by roughly
# concurrency * batch_size events.
concurrency: 100

# Per-request HTTP timeout
request_timeout: 30s

# What to do with a line that is not valid JSON or lacks a parsable
# event_time:
#   abort: stop reading, wait for in-flight uploads, exit with an error
#   skip:  log the line number and continue
on_parse_error: abort

# =============================================================================
# RETRY
# =============================================================================
# Each batch is retried with exponential backoff until it is accepted (HTTP
# 200) or max_attempts is reached. Batches may arrive at the endpoint in a
# different order than they appear in the file.

retry:
  max_attempts: 10
  initial_delay: 500ms
  max_delay: 30s
  backoff_multiplier: 2.0
  # Randomize each delay between 1x and 2x to spread out retries
  jitter: true
  # Total time one batch may spend waiting between attempts
  max_elapsed: 5m
"#
    .to_string()
}
