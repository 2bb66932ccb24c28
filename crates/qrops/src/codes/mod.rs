use crate::prelude::{println, *};

pub mod create;
pub mod list;

// Re-export public data functions
pub use create::create_code_data;
pub use list::list_codes_data;

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// List the account's QR codes, optionally scoped to one folder
    #[clap(name = "list")]
    List(list::ListOptions),

    /// Create a dynamic URL code
    #[clap(name = "create")]
    Create(create::CreateOptions),
}

pub async fn run(command: Commands, global: crate::Global) -> Result<()> {
    match command {
        Commands::List(options) => list::run(options, global).await,
        Commands::Create(options) => create::run(options, global).await,
    }
}
