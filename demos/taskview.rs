use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kumiki::view::{Container, Refresh, ViewFlags};
use kumiki::{
    Message, ProgressView, Task, Tasks, UpdateOptions, ViewKind, ViewTree, Worker, WorkerConfig,
};

// -----------------------------------------------------------------------------
// Task view example
//
// Runs 25 tasks on a small pool behind a progress view, the same way a
// "compute" button of a desktop application would. Every fifth task fails.
// Once the tasks finished, the result table is refreshed and every view
// depending on it follows.
//
// Run with `RUST_LOG=kumiki=debug` to see the refresh order.
// -----------------------------------------------------------------------------

struct Label(&'static str);

impl Refresh for Label {
    fn update(&mut self, _: &mut ViewFlags) -> anyhow::Result<()> {
        println!("refresh {}", self.0);
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    kumiki::init_logging()?;

    let tasks = (0..25)
        .map(|i| {
            Task::one_shot(format!("task {i}"), move || {
                thread::sleep(Duration::from_millis(20 + (i % 5) * 10));
                if i % 5 == 4 {
                    anyhow::bail!("Task {i} failed");
                }
                Ok(())
            })
        })
        .collect();

    let tasks = Arc::new(
        Tasks::builder(tasks)
            .name("compute")
            .print_to_std(true)
            .finish(),
    );

    let config = WorkerConfig::default().threads(4).thread_name("compute");
    let mut view = ProgressView::new(Worker::with_config(&config)?);
    view.set_tasks(tasks.clone());
    view.trigger()?;

    while tasks.is_running() {
        view.poll();
        println!("{}/{}", view.value, view.maximum);
        thread::sleep(Duration::from_millis(50));
    }
    view.wait();

    match view.check() {
        Some(Message::Error(message)) => println!("Error:\n{message}"),
        Some(Message::Warning(message)) => println!("Warning:\n{message}"),
        None => println!("All tasks succeeded"),
    }

    // Views showing the results
    let mut tree = ViewTree::new("main");
    let root = tree.root();
    let results = tree.add_view(root, "results", ViewKind::Items, Label("results"))?;
    let summary = tree.add_view(root, "summary", ViewKind::Basic, Label("summary"))?;
    let chart = tree.add_view(root, "chart", ViewKind::Basic, Label("chart"))?;
    let panel = tree.add_view(root, "panel", ViewKind::Basic, Container)?;
    let status = tree.add_view(panel, "status", ViewKind::Basic, Label("status"))?;

    tree.add_dependency(results, summary)?;
    tree.add_dependency(results, chart)?;
    tree.add_dependency(summary, status)?;
    tree.add_dependency(chart, results)?;

    if tree.has_dependency_cycle() {
        println!("the declared dependencies contain a cycle");
    }

    let refreshed = tree.update_view_with_dependencies(
        results,
        UpdateOptions::default().keep_selection(true),
    )?;
    let names = refreshed
        .into_iter()
        .map(|id| tree.path(id))
        .collect::<Result<Vec<_>, _>>()?;
    println!("refreshed {}", names.join(", "));

    Ok(())
}
