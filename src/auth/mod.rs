pub mod jwt;
pub mod middleware;
pub mod password;
pub mod session;

pub use jwt::{AccessClaims, RefreshClaims, TokenService};
pub use middleware::{get_client_ip, get_user_agent, CurrentUser};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use session::{generate_token_id, refresh_cookie, refresh_token_from_cookies};
