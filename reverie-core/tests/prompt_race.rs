use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Barrier,
};
use std::thread;
use std::time::Duration;

use rand::Rng;
use reverie_core::{
    Cancelled, Choices, InputKind, InputMethod, InputMethods, Prompt, PromptHandle, Result,
};

const PRODUCERS: usize = 8;
const ROUNDS: usize = 200;

/// Producer that resolves from its own thread once every producer is ready.
struct RacingMethod {
    index: usize,
    barrier: Arc<Barrier>,
    wins: Arc<AtomicUsize>,
    worker: Option<thread::JoinHandle<()>>,
    dismissed: Arc<AtomicUsize>,
}

impl InputMethod for RacingMethod {
    fn kind(&self) -> InputKind {
        InputKind::Click
    }

    fn show(&mut self, prompt: PromptHandle) -> Result<()> {
        let index = self.index;
        let barrier = Arc::clone(&self.barrier);
        let wins = Arc::clone(&self.wins);
        self.worker = Some(thread::spawn(move || {
            barrier.wait();
            let jitter = rand::thread_rng().gen_range(0..50);
            for _ in 0..jitter {
                std::hint::spin_loop();
            }
            if prompt.resolve(index, InputKind::Click) {
                wins.fetch_add(1, Ordering::SeqCst);
            }
        }));
        Ok(())
    }

    fn dismiss(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.join().expect("racing producer panicked");
            self.dismissed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn choices(n: usize) -> Choices {
    Choices::decide((0..n).map(|i| format!("Option {i}")), "en-US").expect("valid choices")
}

#[test]
fn exactly_one_of_many_racing_producers_wins() {
    for round in 0..ROUNDS {
        let barrier = Arc::new(Barrier::new(PRODUCERS));
        let wins = Arc::new(AtomicUsize::new(0));
        let dismissed = Arc::new(AtomicUsize::new(0));

        let methods: Vec<Box<dyn InputMethod>> = (0..PRODUCERS)
            .map(|index| {
                Box::new(RacingMethod {
                    index,
                    barrier: Arc::clone(&barrier),
                    wins: Arc::clone(&wins),
                    worker: None,
                    dismissed: Arc::clone(&dismissed),
                }) as Box<dyn InputMethod>
            })
            .collect();

        let prompt = Arc::new(Prompt::new(choices(PRODUCERS), InputMethods::new(methods)));
        prompt.show().expect("show");

        // Two independent waiters must agree on the winner.
        let other = {
            let prompt = Arc::clone(&prompt);
            thread::spawn(move || prompt.wait(Some(Duration::from_secs(5))))
        };
        let mine = prompt
            .wait(Some(Duration::from_secs(5)))
            .unwrap_or_else(|c| panic!("round {round}: prompt cancelled: {c}"));
        let theirs = other
            .join()
            .expect("second waiter panicked")
            .unwrap_or_else(|c| panic!("round {round}: second waiter cancelled: {c}"));

        prompt.dismiss();

        assert_eq!(mine, theirs, "round {round}: waiters disagree");
        assert_eq!(wins.load(Ordering::SeqCst), 1, "round {round}: winners");
        assert_eq!(dismissed.load(Ordering::SeqCst), PRODUCERS);
        assert_eq!(mine.choice.text(), format!("Option {}", mine.index));
    }
}

#[test]
fn late_resolves_after_interrupt_are_ignored() {
    let prompt = Arc::new(Prompt::new(choices(3), InputMethods::default()));
    let handle = prompt.handle();
    let interrupter = prompt.interrupter();

    let waiter = {
        let prompt = Arc::clone(&prompt);
        thread::spawn(move || prompt.wait(None))
    };

    thread::sleep(Duration::from_millis(20));
    interrupter.interrupt();
    assert_eq!(
        waiter.join().expect("waiter panicked"),
        Err(Cancelled::Interrupted)
    );

    let late: Vec<_> = (0..4)
        .map(|i| {
            let handle = handle.clone();
            thread::spawn(move || handle.resolve(i % 3, InputKind::Speech))
        })
        .collect();
    for t in late {
        assert!(!t.join().expect("late producer panicked"));
    }
    assert_eq!(prompt.wait(None), Err(Cancelled::Interrupted));
}

#[test]
fn interrupt_returns_within_bounded_time() {
    let prompt = Arc::new(Prompt::new(choices(2), InputMethods::default()));
    let interrupter = prompt.interrupter();

    let waiter = {
        let prompt = Arc::clone(&prompt);
        thread::spawn(move || {
            let started = std::time::Instant::now();
            let outcome = prompt.wait(None);
            (outcome, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(50));
    interrupter.interrupt();
    let (outcome, elapsed) = waiter.join().expect("waiter panicked");
    assert_eq!(outcome, Err(Cancelled::Interrupted));
    assert!(elapsed < Duration::from_secs(2), "wait took {elapsed:?}");

    // Lock released: taking it again does not block.
    assert!(prompt.lock().is_settled());
}
