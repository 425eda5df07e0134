use std::num::NonZeroU64;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    ledger::{SharedLedger, WithdrawError},
    protocol::{
        connection::{Connection, ConnectionErr},
        message::{Request, Response},
    },
};

const PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Unauthenticated,
    AwaitingPassword(String),
    Authenticated(String),
    Closed,
}

/// The authentication and command state of a single terminal
#[derive(Debug)]
pub struct Session {
    state: State,
    ledger: SharedLedger,
}

impl Session {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            state: State::Unauthenticated,
            ledger,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    #[cfg(test)]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Serves requests from the connection until the terminal says goodbye or goes away
    pub async fn run<S>(mut self, mut conn: Connection<S>) -> Result<(), ConnectionErr>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while !self.is_closed() {
            let Some(request) = conn.read_request().await? else {
                tracing::debug!("peer disconnected");
                self.state = State::Closed;
                break;
            };

            if let Some(response) = self.handle(request).await {
                conn.send_response(response).await?;
            }
        }

        conn.shutdown().await
    }

    /// Applies a single request to the session
    ///
    /// returns the response for the terminal, or None once the session is closed.
    pub async fn handle(&mut self, request: Request) -> Option<Response> {
        let state = std::mem::replace(&mut self.state, State::Closed);

        let (state, response) = match (state, request) {
            (State::Closed, _) => return None,

            (state, Request::Bye) => {
                if let State::Authenticated(id) = state {
                    tracing::info!("account {} logged out", id);
                }
                (State::Closed, Response::Bye)
            }

            (State::Unauthenticated, Request::Hello(id)) => {
                if !is_account_id(&id) {
                    (State::Unauthenticated, Response::Error)
                } else if self.ledger.lookup(&id).await.is_none() {
                    tracing::info!("unknown account {}", id);
                    (State::Unauthenticated, Response::Error)
                } else {
                    (State::AwaitingPassword(id), Response::AuthRequired)
                }
            }

            (State::AwaitingPassword(id), Request::Pass(password)) => {
                if is_password(&password) && self.ledger.verify_credential(&id, &password).await {
                    tracing::info!("account {} authenticated", id);
                    (State::Authenticated(id), Response::Authenticated)
                } else {
                    tracing::info!("bad credential for account {}", id);
                    (State::Unauthenticated, Response::Error)
                }
            }

            (State::Authenticated(id), Request::Balance) => {
                let response = match self.ledger.lookup(&id).await {
                    Some(account) => {
                        tracing::info!("account {} balance query: {}", id, account.balance);
                        Response::Amount(account.balance)
                    }
                    None => Response::Error,
                };
                (State::Authenticated(id), response)
            }

            (State::Authenticated(id), Request::Withdraw(amount)) => {
                let response = match parse_amount(&amount) {
                    Some(amount) => self.withdraw(&id, amount).await,
                    None => Response::Error,
                };
                (State::Authenticated(id), response)
            }

            // malformed, or not valid in the current state
            (state, request) => {
                tracing::debug!("rejected {:?} while {:?}", request, state);
                (state, Response::Error)
            }
        };

        self.state = state;
        Some(response)
    }

    async fn withdraw(&self, id: &str, amount: NonZeroU64) -> Response {
        match self.ledger.withdraw(id, amount).await {
            Ok(balance) => {
                tracing::info!("account {} withdrew {}, balance: {}", id, amount, balance);
                Response::Withdrawn
            }
            Err(WithdrawError::Persistence(err)) => {
                tracing::error!(
                    "failed to persist a withdrawal of {} from account {}: {}",
                    amount,
                    id,
                    err
                );
                Response::Error
            }
            Err(err) => {
                tracing::info!("account {} withdrawal of {} rejected: {}", id, amount, err);
                Response::Error
            }
        }
    }
}

fn is_account_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_password(password: &str) -> bool {
    password.len() == PASSWORD_LEN && password.bytes().all(|byte| byte.is_ascii_digit())
}

// a positive integer, written in plain digits
fn parse_amount(amount: &str) -> Option<NonZeroU64> {
    if amount.is_empty() || !amount.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    amount.parse().ok()
}
