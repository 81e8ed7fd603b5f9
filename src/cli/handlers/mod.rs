mod init;
pub use init::cmd_init;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Global override for workspace directory (set by -C flag)
static WORKSPACE_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::recovery::{prune_recovery, read_recovery_entries};
use crate::io::state::{DetailState, read_detail_state, write_detail_state};
use crate::io::store::{FileStore, SyncAdapter};
use crate::io::workspace_io::{self, WorkspaceError};
use crate::model::checklist::{Checklist, ChecklistDraft};
use crate::model::config::SyncStrategy;
use crate::model::dropdown::{Dropdown, DropdownDraft};
use crate::model::learning_page::LearningPageDraft;
use crate::model::task::{TaskContent, TaskDraft};
use crate::model::user::{User, UserRole};
use crate::model::workspace::Workspace;
use crate::ops::check;
use crate::ops::tree_ops::{
    SiblingGroup, find_checklist, find_dropdown, find_task_anywhere, for_each_dropdown,
    locate_dropdown_anywhere,
};
use crate::session::store::AppStore;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;

    // Store -C override for start_dir()
    if let Some(ref dir) = cli.workspace_dir {
        let abs = std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?;
        WORKSPACE_DIR_OVERRIDE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(abs);
    }

    match cli.command {
        Commands::Init(args) => cmd_init(args),

        // Accounts and settings
        Commands::User(cmd) => match cmd.action {
            UserAction::Add { email, admin } => cmd_user_add(&email, admin, json),
            UserAction::List => cmd_user_list(json),
        },
        Commands::Login(args) => cmd_login(&args.email),
        Commands::Logout => cmd_logout(),
        Commands::Whoami => cmd_whoami(json),
        Commands::Config(args) => cmd_config(&args.key, &args.value),

        // Read commands
        Commands::Tree(args) => cmd_tree(args, json),
        Commands::Stats => cmd_stats(json),
        Commands::Check => cmd_check(json),
        Commands::Show(args) => cmd_show(&args.id, args.html, json),
        Commands::Recovery(args) => match args.action {
            Some(RecoveryAction::Prune(prune)) => cmd_recovery_prune(&prune, json),
            None => cmd_recovery(args.limit, json),
        },

        // Detail view
        Commands::Open(args) => cmd_open(&args.id, json),
        Commands::Follow(args) => cmd_follow(&args.id, json),
        Commands::Back => cmd_back(json),
        Commands::Close => cmd_close(),

        // Write commands
        Commands::Checklist(cmd) => cmd_checklist(cmd.action, json),
        Commands::Section(cmd) => cmd_section(cmd.action, json),
        Commands::Task(cmd) => cmd_task(cmd.action, json),
        Commands::Mv(args) => cmd_mv(&args.dragged, &args.target, json),
        Commands::Page(cmd) => cmd_page(cmd.action, json),
    }
}

// ---------------------------------------------------------------------------
// Workspace and session loading
// ---------------------------------------------------------------------------

/// The -C directory if given, else the current directory.
pub(crate) fn start_dir() -> Result<PathBuf, WorkspaceError> {
    let override_dir = WORKSPACE_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match override_dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

fn load_workspace_cwd() -> Result<Workspace, WorkspaceError> {
    let root = workspace_io::discover_workspace(&start_dir()?)?;
    workspace_io::load_workspace(&root)
}

fn open_store(workspace: &Workspace) -> FileStore {
    FileStore::open(&workspace.data_dir, workspace.config.sync.lock_timeout_ms)
}

/// The signed-in user recorded in config.toml, if any.
fn session_user(
    workspace: &Workspace,
    store: &FileStore,
) -> Result<Option<User>, Box<dyn std::error::Error>> {
    let Some(email) = workspace.config.session.user.as_deref() else {
        return Ok(None);
    };
    match store.find_user(email)? {
        Some(user) => Ok(Some(user)),
        None => Err(format!(
            "signed-in user {} no longer exists (run `ac login <email>`)",
            email
        )
        .into()),
    }
}

/// Load the workspace, the signed-in user's tree and the saved detail view.
fn load_app() -> Result<(Workspace, AppStore<FileStore>), Box<dyn std::error::Error>> {
    let workspace = load_workspace_cwd()?;
    let store = open_store(&workspace);
    let user = session_user(&workspace, &store)?;
    let mut app = AppStore::load(store, user, workspace.config.sync.strategy)?;
    if let Some(state) = read_detail_state(&workspace.data_dir) {
        app.restore_detail(state.into());
    }
    Ok((workspace, app))
}

fn save_detail(workspace: &Workspace, app: &AppStore<FileStore>) -> CmdResult {
    write_detail_state(&workspace.data_dir, &DetailState::from(app.detail()))?;
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

/// Checklist ID and parent dropdown ID (if nested) for a dropdown.
/// Turn a mutator's unresolved-id result into a not-found error.
fn require_found(resolved: bool, kind: &str, id: &str) -> CmdResult {
    if resolved {
        Ok(())
    } else {
        Err(format!("{} not found: {}", kind, id).into())
    }
}

fn dropdown_location(tree: &[Checklist], id: &str) -> Option<(String, Option<String>)> {
    match locate_dropdown_anywhere(tree, id)? {
        SiblingGroup::Root { checklist_id } => Some((checklist_id, None)),
        SiblingGroup::Nested {
            checklist_id,
            parent_id,
        } => Some((checklist_id, Some(parent_id))),
        SiblingGroup::Tasks { .. } => None,
    }
}

fn find_dropdown_anywhere<'a>(tree: &'a [Checklist], id: &str) -> Option<&'a Dropdown> {
    tree.iter().find_map(|c| find_dropdown(&c.dropdowns, id))
}

// ---------------------------------------------------------------------------
// Accounts and settings
// ---------------------------------------------------------------------------

fn cmd_user_add(email: &str, admin: bool, json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let store = open_store(&workspace);
    let role = if admin { UserRole::Admin } else { UserRole::User };

    // The first account may be an admin; after that only admins make admins
    if admin && !store.list_users()?.is_empty() {
        let current = session_user(&workspace, &store)?;
        if !current.is_some_and(|u| u.is_admin()) {
            return Err("only admins can create admin accounts".into());
        }
    }

    let user = store.sign_up(email, role)?;
    if json {
        print_json(&user)
    } else {
        println!("Added user {} ({}) [{}]", user.email, user.id, user.role);
        Ok(())
    }
}

fn cmd_user_list(json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let users = open_store(&workspace).list_users()?;
    if json {
        return print_json(&users);
    }
    if users.is_empty() {
        println!("No users yet (run `ac user add <email>`)");
    }
    let current = workspace.config.session.user.as_deref();
    for user in &users {
        let marker = if current.is_some_and(|e| e.eq_ignore_ascii_case(&user.email)) {
            "*"
        } else {
            " "
        };
        println!("{} {} {} [{}]", marker, user.id, user.email, user.role);
    }
    Ok(())
}

fn cmd_login(email: &str) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let store = open_store(&workspace);
    let user = store
        .find_user(email)?
        .ok_or_else(|| format!("no user with email {} (run `ac user add {}`)", email, email))?;
    let (_, mut doc) = config_io::read_config(&workspace.data_dir)?;
    config_io::set_session_user(&mut doc, &user.email);
    config_io::write_config(&workspace.data_dir, &doc)?;
    tracing::info!(user = %user.email, "signed in");
    println!("Signed in as {} [{}]", user.email, user.role);
    Ok(())
}

fn cmd_logout() -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let (_, mut doc) = config_io::read_config(&workspace.data_dir)?;
    config_io::clear_session_user(&mut doc);
    config_io::write_config(&workspace.data_dir, &doc)?;
    write_detail_state(&workspace.data_dir, &DetailState::default())?;
    println!("Signed out");
    Ok(())
}

fn cmd_whoami(json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let store = open_store(&workspace);
    let user = session_user(&workspace, &store)?;
    if json {
        return print_json(&user);
    }
    match user {
        Some(u) => println!("{} ({}) [{}]", u.email, u.id, u.role),
        None => println!("not signed in"),
    }
    Ok(())
}

fn cmd_config(key: &str, value: &str) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let (_, mut doc) = config_io::read_config(&workspace.data_dir)?;
    match key {
        "sync.strategy" => {
            let strategy = SyncStrategy::parse_strategy(value).ok_or_else(|| {
                format!("unknown strategy '{}' (expected: refetch, patch)", value)
            })?;
            config_io::set_sync_strategy(&mut doc, strategy);
        }
        "sync.lock_timeout_ms" => {
            let ms: u64 = value
                .parse()
                .map_err(|_| format!("lock_timeout_ms must be a whole number, got '{}'", value))?;
            config_io::set_lock_timeout(&mut doc, ms);
        }
        "workspace.name" => config_io::set_workspace_name(&mut doc, value),
        _ => {
            return Err(format!(
                "unknown setting '{}' (expected: sync.strategy, sync.lock_timeout_ms, workspace.name)",
                key
            )
            .into());
        }
    }
    config_io::write_config(&workspace.data_dir, &doc)?;
    println!("{} = {}", key, value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_tree(args: TreeArgs, json: bool) -> CmdResult {
    let (_, app) = load_app()?;
    let checklists: Vec<&Checklist> = match args.checklist.as_deref() {
        Some(id) => vec![
            find_checklist(app.tree(), id)
                .ok_or_else(|| format!("checklist not found: {}", id))?,
        ],
        None => app.tree().iter().collect(),
    };

    if json {
        let out: Vec<ChecklistJson> = checklists.into_iter().map(checklist_to_json).collect();
        return print_json(&out);
    }
    if checklists.is_empty() {
        println!("No checklists yet");
        return Ok(());
    }
    for (i, checklist) in checklists.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_lines(format_checklist(checklist, args.all));
    }
    Ok(())
}

fn cmd_stats(json: bool) -> CmdResult {
    let (_, app) = load_app()?;
    let mut entries = Vec::new();
    let (mut done_total, mut task_total) = (0, 0);
    for checklist in app.tree() {
        let (done, total) = checklist.completion();
        done_total += done;
        task_total += total;
        let mut dropdowns = 0;
        for_each_dropdown(&checklist.dropdowns, &mut |_: &Dropdown, _: usize| dropdowns += 1);
        entries.push(ChecklistStatsJson {
            id: checklist.id.clone(),
            title: checklist.title.clone(),
            dropdowns,
            progress: progress_json(done, total),
        });
    }
    let stats = StatsJson {
        checklists: entries,
        totals: progress_json(done_total, task_total),
    };

    if json {
        return print_json(&stats);
    }
    for entry in &stats.checklists {
        println!(
            "  {} ({})  {} sections  {}/{} done  {}%",
            entry.title,
            entry.id,
            entry.dropdowns,
            entry.progress.done,
            entry.progress.total,
            entry.progress.percent
        );
    }
    println!(
        "  total: {}/{} done  {}%",
        stats.totals.done, stats.totals.total, stats.totals.percent
    );
    Ok(())
}

fn cmd_check(json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let store = open_store(&workspace);
    let tree = store.fetch_all()?;
    let pages = store.list_pages()?;
    let result = check::check_workspace(&tree, &pages);

    if json {
        print_json(&result)?;
    } else {
        if !result.errors.is_empty() {
            println!("Errors:");
            for err in &result.errors {
                match err {
                    check::CheckError::DuplicateId { kind, id, count } => {
                        println!("  {} {} is used {} times", kind, id, count);
                    }
                    check::CheckError::DanglingTaskLink { task_id, target } => {
                        println!("  {} links to missing task {}", task_id, target);
                    }
                    check::CheckError::DanglingPageLink { page_id, task_id } => {
                        println!("  page {} is linked to missing task {}", page_id, task_id);
                    }
                }
            }
        }
        if !result.warnings.is_empty() {
            if !result.errors.is_empty() {
                println!();
            }
            println!("Warnings:");
            for warning in &result.warnings {
                match warning {
                    check::CheckWarning::SparsePositions { parent, positions } => {
                        println!(
                            "  children of {} have gaps in positions: {:?}",
                            parent, positions
                        );
                    }
                    check::CheckWarning::DuplicatePosition { parent, position } => {
                        println!("  children of {} share position {}", parent, position);
                    }
                    check::CheckWarning::EmptyTitle { kind, id } => {
                        println!("  {} {} has an empty title", kind, id);
                    }
                }
            }
        }
        if result.valid && result.warnings.is_empty() {
            println!("All checks passed");
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(format!("{} integrity error(s) found", result.errors.len()).into())
    }
}

/// Print a task's detail view, with `referrer` shown when it is the open task.
fn print_task(app: &mut AppStore<FileStore>, id: &str, html: bool, json: bool) -> CmdResult {
    let pages = app.pages_for_task(id)?;
    let referrer = if app.detail().open_task() == Some(id) {
        app.detail().referrer().map(str::to_string)
    } else {
        None
    };
    let (checklist, dropdown, task) =
        find_task_anywhere(app.tree(), id).ok_or_else(|| format!("task not found: {}", id))?;
    if json {
        print_json(&task_detail_to_json(checklist, dropdown, task, &pages, referrer.as_deref()))
    } else {
        print_lines(format_task_detail(
            checklist,
            dropdown,
            task,
            &pages,
            referrer.as_deref(),
            html,
        ));
        Ok(())
    }
}

fn cmd_show(id: &str, html: bool, json: bool) -> CmdResult {
    let (_, mut app) = load_app()?;
    print_task(&mut app, id, html, json)
}

fn cmd_recovery(limit: Option<usize>, json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let entries = read_recovery_entries(&workspace.data_dir, limit);
    if json {
        let out: Vec<serde_json::Value> = entries.iter().map(|e| e.to_json()).collect();
        return print_json(&out);
    }
    if entries.is_empty() {
        println!("Recovery log is empty");
    }
    for entry in &entries {
        print_lines(format_recovery_entry(entry));
    }
    Ok(())
}

fn cmd_recovery_prune(args: &RecoveryPruneArgs, json: bool) -> CmdResult {
    let workspace = load_workspace_cwd()?;
    let before = args.before.as_deref().map(parse_before).transpose()?;
    let removed = prune_recovery(&workspace.data_dir, before, args.all)?;
    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    println!("Pruned {} recovery entr{}", removed, if removed == 1 { "y" } else { "ies" });
    Ok(())
}

/// Accept an RFC 3339 timestamp or a plain `YYYY-MM-DD` (midnight UTC).
fn parse_before(s: &str) -> Result<chrono::DateTime<chrono::Utc>, Box<dyn std::error::Error>> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&chrono::Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid --before value \"{}\": use YYYY-MM-DD or RFC 3339", s))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

// ---------------------------------------------------------------------------
// Detail view
// ---------------------------------------------------------------------------

fn cmd_open(id: &str, json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    if !app.open_task(id) {
        return Err(format!("task not found: {}", id).into());
    }
    save_detail(&workspace, &app)?;
    print_task(&mut app, id, false, json)
}

fn cmd_follow(id: &str, json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    let open = app
        .detail()
        .open_task()
        .map(str::to_string)
        .ok_or("no task is open (run `ac open <task>`)")?;
    if !app.open_task_links().iter().any(|l| l == id) {
        return Err(format!("{} does not link to {}", open, id).into());
    }
    if !app.follow_link(id) {
        return Err(format!("linked task {} not found", id).into());
    }
    save_detail(&workspace, &app)?;
    print_task(&mut app, id, false, json)
}

fn cmd_back(json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    let id = app.back().ok_or("nothing to go back to")?;
    save_detail(&workspace, &app)?;
    print_task(&mut app, &id, false, json)
}

fn cmd_close() -> CmdResult {
    let (workspace, mut app) = load_app()?;
    app.close_task();
    save_detail(&workspace, &app)?;
    println!("Closed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Authoring
// ---------------------------------------------------------------------------

fn cmd_checklist(action: ChecklistAction, json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    match action {
        ChecklistAction::Add { title, from } => {
            let mut draft = match from {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .map_err(|e| format!("could not read {}: {}", path, e))?;
                    serde_json::from_str::<ChecklistDraft>(&text)
                        .map_err(|e| format!("invalid checklist draft in {}: {}", path, e))?
                }
                None => ChecklistDraft::default(),
            };
            if let Some(title) = title {
                draft.title = title;
            }
            if draft.title.is_empty() {
                return Err("give a checklist title or --from <file>".into());
            }
            let created = app.add_checklist(&draft)?;
            if json {
                print_json(&checklist_to_json(&created))?;
            } else {
                println!("Created checklist {} \"{}\"", created.id, created.title);
            }
        }
        ChecklistAction::Rename { id, title } => {
            require_found(app.rename_checklist(&id, &title)?, "checklist", &id)?;
            println!("Renamed {}", id);
        }
        ChecklistAction::Rm { id } => {
            require_found(app.delete_checklist(&id)?, "checklist", &id)?;
            save_detail(&workspace, &app)?;
            println!("Deleted checklist {}", id);
        }
    }
    Ok(())
}

fn cmd_section(action: SectionAction, json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    match action {
        SectionAction::Add {
            checklist,
            title,
            parent,
            expanded,
        } => {
            let mut draft = DropdownDraft::new(title);
            draft.expanded = expanded;
            let created = app
                .add_dropdown(&checklist, &draft, parent.as_deref())?
                .ok_or_else(|| match &parent {
                    Some(p) => format!("section {} not found in checklist {}", p, checklist),
                    None => format!("checklist not found: {}", checklist),
                })?;
            if json {
                print_json(&dropdown_to_json(&created))?;
            } else {
                println!("Added section {} \"{}\"", created.id, created.title);
            }
        }
        SectionAction::Rename { id, title } => {
            let (checklist_id, parent) = dropdown_location(app.tree(), &id)
                .ok_or_else(|| format!("section not found: {}", id))?;
            let mut dropdown = find_dropdown_anywhere(app.tree(), &id)
                .cloned()
                .ok_or_else(|| format!("section not found: {}", id))?;
            dropdown.title = title;
            let renamed = app.update_dropdown(&checklist_id, &dropdown, parent.as_deref())?;
            require_found(renamed, "section", &id)?;
            println!("Renamed {}", id);
        }
        SectionAction::Rm { id } => {
            let (checklist_id, parent) = dropdown_location(app.tree(), &id)
                .ok_or_else(|| format!("section not found: {}", id))?;
            let deleted = app.delete_dropdown(&checklist_id, &id, parent.as_deref())?;
            require_found(deleted, "section", &id)?;
            save_detail(&workspace, &app)?;
            println!("Deleted section {}", id);
        }
        SectionAction::Toggle { id } => {
            let (checklist_id, _) = dropdown_location(app.tree(), &id)
                .ok_or_else(|| format!("section not found: {}", id))?;
            require_found(app.toggle_dropdown_expanded(&checklist_id, &id)?, "section", &id)?;
            let expanded = find_dropdown_anywhere(app.tree(), &id).is_some_and(|d| d.expanded);
            println!("{} {}", id, if expanded { "expanded" } else { "collapsed" });
        }
    }
    Ok(())
}

fn cmd_task(action: TaskAction, json: bool) -> CmdResult {
    let (workspace, mut app) = load_app()?;
    match action {
        TaskAction::Add {
            section,
            title,
            subheader,
            body,
        } => {
            let (checklist_id, _) = dropdown_location(app.tree(), &section)
                .ok_or_else(|| format!("section not found: {}", section))?;
            let mut draft = TaskDraft::new(title);
            draft.content =
                TaskContent::new(subheader.unwrap_or_default(), body.unwrap_or_default());
            let created = app
                .add_task(&checklist_id, &section, &draft, None)?
                .ok_or_else(|| format!("section not found: {}", section))?;
            if json {
                print_json(&task_to_json(&created))?;
            } else {
                println!("Added task {} \"{}\"", created.id, created.title);
            }
        }
        TaskAction::Edit {
            id,
            title,
            subheader,
            body,
        } => {
            let (checklist_id, dropdown_id, mut task) = find_task_anywhere(app.tree(), &id)
                .map(|(c, d, t)| (c.id.clone(), d.id.clone(), t.clone()))
                .ok_or_else(|| format!("task not found: {}", id))?;
            if title.is_none() && subheader.is_none() && body.is_none() {
                return Err("nothing to change (use --title, --subheader or --body)".into());
            }
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(subheader) = subheader {
                task.content.subheader = subheader;
            }
            if let Some(body) = body {
                task.content.body = body;
            }
            let updated = app.update_task(&checklist_id, &dropdown_id, &task, None)?;
            require_found(updated, "task", &id)?;
            println!("Updated {}", id);
        }
        TaskAction::Rm { id } => {
            let (checklist_id, dropdown_id) = find_task_anywhere(app.tree(), &id)
                .map(|(c, d, _)| (c.id.clone(), d.id.clone()))
                .ok_or_else(|| format!("task not found: {}", id))?;
            let deleted = app.delete_task(&checklist_id, &dropdown_id, &id, None)?;
            require_found(deleted, "task", &id)?;
            save_detail(&workspace, &app)?;
            println!("Deleted task {}", id);
        }
        TaskAction::Done { id, undo } => {
            let (checklist_id, dropdown_id, completed) = find_task_anywhere(app.tree(), &id)
                .map(|(c, d, t)| (c.id.clone(), d.id.clone(), t.completed))
                .ok_or_else(|| format!("task not found: {}", id))?;
            let want = !undo;
            if completed != want {
                let toggled = app.toggle_task_completion(&checklist_id, &dropdown_id, &id)?;
                require_found(toggled, "task", &id)?;
            }
            let state = if want { "done" } else { "not done" };
            println!("{} {}", id, state);
        }
    }
    Ok(())
}

fn cmd_mv(dragged: &str, target: &str, json: bool) -> CmdResult {
    let (_, mut app) = load_app()?;
    if !app.drag_start(dragged) {
        return Err(format!("no section or task with id {}", dragged).into());
    }
    let outcome = app.drop_on(target)?;
    if json {
        print_json(&drop_to_json(&outcome))
    } else {
        println!("{}", format_drop_outcome(&outcome));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Learning pages
// ---------------------------------------------------------------------------

fn cmd_page(action: PageAction, json: bool) -> CmdResult {
    let (_, mut app) = load_app()?;
    match action {
        PageAction::Add { title, body, tasks } => {
            let page = app.create_page(&LearningPageDraft {
                title,
                body,
                task_ids: tasks,
            })?;
            if json {
                print_json(&page)?;
            } else {
                println!("Created page {} \"{}\"", page.id, page.title);
            }
        }
        PageAction::Edit { id, title, body } => {
            let existing = app.page(&id)?;
            let draft = LearningPageDraft {
                title: title.unwrap_or(existing.title),
                body: body.unwrap_or(existing.body),
                task_ids: existing.task_ids,
            };
            app.update_page(&id, &draft)?;
            println!("Updated {}", id);
        }
        PageAction::Rm { id } => {
            app.delete_page(&id)?;
            println!("Deleted page {}", id);
        }
        PageAction::List => {
            let pages = app.pages()?;
            if json {
                return print_json(&pages);
            }
            if pages.is_empty() {
                println!("No learning pages yet");
            }
            for page in &pages {
                println!("{}", format_page_line(page));
            }
        }
        PageAction::Show { id, html } => {
            let page = app.page(&id)?;
            if json {
                return print_json(&page);
            }
            print_lines(format_page(&page, html));
        }
        PageAction::Link { page, task } => {
            app.link_page(&page, &task)?;
            println!("Linked {} to {}", page, task);
        }
        PageAction::Unlink { page, task } => {
            if !app.unlink_page(&page, &task)? {
                return Err(format!("{} is not linked to {}", page, task).into());
            }
            println!("Unlinked {} from {}", page, task);
        }
    }
    Ok(())
}
