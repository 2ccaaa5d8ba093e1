pub mod api;
pub mod error;
pub mod stream;

use crate::agent::PolicyAgent;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<PolicyAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<PolicyAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::serve(self.addr.clone(), self.agent.clone(), self.args.clone()).await
    }
}
