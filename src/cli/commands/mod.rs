use anyhow::Result;

pub mod config;
pub mod demo;
pub mod flows;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
