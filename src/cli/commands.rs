use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ac", about = concat!("aftercare v", env!("CARGO_PKG_VERSION"), " - a checklist for the weeks after a death"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different workspace directory
    #[arg(short = 'C', long = "workspace-dir", global = true)]
    pub workspace_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new workspace in the current directory
    Init(InitArgs),
    /// Manage user accounts
    User(UserCmd),
    /// Sign in as an existing user
    Login(LoginArgs),
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Change a config setting
    Config(ConfigArgs),
    /// Show checklists as a tree
    Tree(TreeArgs),
    /// Show completion statistics
    Stats,
    /// Validate workspace integrity
    Check,
    /// Checklist authoring (admin)
    Checklist(ChecklistCmd),
    /// Section authoring (admin); `toggle` is open to everyone
    Section(SectionCmd),
    /// Task authoring (admin); `done` is open to everyone
    Task(TaskCmd),
    /// Show a task's details without changing the open task
    Show(ShowArgs),
    /// Open a task in the detail view
    Open(OpenArgs),
    /// Follow a task link from the open task
    Follow(FollowArgs),
    /// Return to the task a link was followed from
    Back,
    /// Close the detail view
    Close,
    /// Drag an item and drop it on a sibling (lands right after the target)
    Mv(MvArgs),
    /// Learning pages
    Page(PageCmd),
    /// Show the recovery log
    Recovery(RecoveryArgs),
}

// ---------------------------------------------------------------------------
// Workspace and session args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Workspace name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Email of the first admin account to create
    #[arg(long)]
    pub admin: Option<String>,
}

#[derive(Args)]
pub struct UserCmd {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user
    Add {
        email: String,
        /// Give the user the admin role
        #[arg(long)]
        admin: bool,
    },
    /// List registered users
    List,
}

#[derive(Args)]
pub struct LoginArgs {
    pub email: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Setting: sync.strategy, sync.lock_timeout_ms or workspace.name
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TreeArgs {
    /// Only this checklist
    pub checklist: Option<String>,
    /// Show collapsed sections' contents too
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
    /// Render task links as HTML anchors instead of plain text
    #[arg(long)]
    pub html: bool,
}

#[derive(Args)]
pub struct OpenArgs {
    pub id: String,
}

#[derive(Args)]
pub struct FollowArgs {
    /// ID of a task linked from the open task's body
    pub id: String,
}

#[derive(Args)]
pub struct RecoveryArgs {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Show only the N most recent entries
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this date or timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long, conflicts_with = "before")]
    pub all: bool,
}

// ---------------------------------------------------------------------------
// Authoring args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ChecklistCmd {
    #[command(subcommand)]
    pub action: ChecklistAction,
}

#[derive(Subcommand)]
pub enum ChecklistAction {
    /// Create a checklist, optionally with sections and tasks from a JSON draft
    Add {
        /// Title (overrides the draft's title)
        title: Option<String>,
        /// JSON file with a full checklist draft
        #[arg(long)]
        from: Option<String>,
    },
    /// Rename a checklist
    Rename { id: String, title: String },
    /// Delete a checklist and everything in it
    Rm { id: String },
}

#[derive(Args)]
pub struct SectionCmd {
    #[command(subcommand)]
    pub action: SectionAction,
}

#[derive(Subcommand)]
pub enum SectionAction {
    /// Add a section to a checklist, or nested under another section
    Add {
        checklist: String,
        title: String,
        /// Parent section ID
        #[arg(long)]
        parent: Option<String>,
        /// Start expanded
        #[arg(long)]
        expanded: bool,
    },
    /// Rename a section
    Rename { id: String, title: String },
    /// Delete a section, its subsections and tasks
    Rm { id: String },
    /// Expand or collapse a section
    Toggle { id: String },
}

#[derive(Args)]
pub struct TaskCmd {
    #[command(subcommand)]
    pub action: TaskAction,
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task to a section
    Add {
        section: String,
        title: String,
        #[arg(long)]
        subheader: Option<String>,
        /// Body text; may contain [[task:<id>|<label>]] links
        #[arg(long)]
        body: Option<String>,
    },
    /// Edit a task's title or content
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subheader: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Delete a task
    Rm { id: String },
    /// Mark a task done for the signed-in user
    Done {
        id: String,
        /// Mark it not done instead
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Args)]
pub struct MvArgs {
    /// Section or task being dragged
    pub dragged: String,
    /// Sibling to drop on
    pub target: String,
}

#[derive(Args)]
pub struct PageCmd {
    #[command(subcommand)]
    pub action: PageAction,
}

#[derive(Subcommand)]
pub enum PageAction {
    /// Write a new learning page
    Add {
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Related task (repeatable)
        #[arg(long = "task")]
        tasks: Vec<String>,
    },
    /// Edit a page's title or body
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Delete a page
    Rm { id: String },
    /// List pages
    List,
    /// Show a page
    Show {
        id: String,
        /// Render task links as HTML anchors
        #[arg(long)]
        html: bool,
    },
    /// Relate a page to a task
    Link { page: String, task: String },
    /// Remove a page-task relation
    Unlink { page: String, task: String },
}
