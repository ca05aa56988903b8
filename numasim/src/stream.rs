//! Incremental delivery of run results.
//!
//! A [`StreamDispatcher`] turns an ordered sequence of thread results into a
//! timed sequence of [`StreamEvent`]s, always finished by a single
//! [`StreamEvent::End`], unless cancelled.

// Imports
use {
	crate::ThreadResult,
	futures::{Stream, StreamExt},
	std::{
		mem,
		pin::Pin,
		task::{Context, Poll},
		time::Duration,
	},
	tokio::{sync::mpsc, time::MissedTickBehavior},
	tokio_stream::wrappers::ReceiverStream,
	tokio_util::sync::{CancellationToken, DropGuard},
};

/// Completion code of a successful stream
pub const SUCCESS_CODE: i32 = 0;

/// Dispatch mode
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DispatchMode {
	/// Emits each result on its own, waiting `delay` after each one
	Paced { delay: Duration },

	/// Buffers results and emits them together every `flush_interval`
	Batched { flush_interval: Duration },
}

impl DispatchMode {
	pub const DEFAULT_PACED_DELAY: Duration = Duration::from_millis(50);
	pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
}

impl Default for DispatchMode {
	fn default() -> Self {
		Self::Paced {
			delay: Self::DEFAULT_PACED_DELAY,
		}
	}
}

/// Stream event
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum StreamEvent {
	/// A single result
	Result(ThreadResult),

	/// Several consecutive results
	Batch(Vec<ThreadResult>),

	/// End of the stream
	End { code: i32 },

	/// The results couldn't be produced
	Error { message: String },
}

impl StreamEvent {
	/// Returns the name of this event
	pub fn name(&self) -> &'static str {
		match self {
			Self::Result(_) => "result",
			Self::Batch(_) => "batch",
			Self::End { .. } => "end",
			Self::Error { .. } => "error",
		}
	}
}

/// Stream dispatcher
#[derive(Debug)]
pub struct StreamDispatcher {
	/// Mode
	mode: DispatchMode,

	/// Capacity of the event channel
	channel_capacity: usize,

	/// Cancellation token
	cancel: CancellationToken,
}

impl StreamDispatcher {
	/// Default event channel capacity
	pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

	/// Creates a new dispatcher
	pub fn new(mode: DispatchMode) -> Self {
		Self {
			mode,
			channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
			cancel: CancellationToken::new(),
		}
	}

	/// Sets the event channel capacity
	#[must_use]
	pub fn with_channel_capacity(self, channel_capacity: usize) -> Self {
		Self {
			channel_capacity: channel_capacity.max(1),
			..self
		}
	}

	/// Returns a token that cancels the dispatch.
	///
	/// Once cancelled, no further events are emitted, including the end event.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Starts dispatching `results`.
	///
	/// Must be called within a tokio runtime. Dropping the returned stream
	/// cancels the dispatch.
	pub fn dispatch<S>(self, results: S) -> EventStream
	where
		S: Stream<Item = ThreadResult> + Send + 'static,
	{
		let (tx, rx) = mpsc::channel(self.channel_capacity);
		let dispatch = Dispatch {
			tx,
			cancel: self.cancel.clone(),
		};

		let mode = self.mode;
		tokio::spawn(async move {
			let results = Box::pin(results);
			let outcome = match mode {
				DispatchMode::Paced { delay } => dispatch.paced(results, delay).await,
				DispatchMode::Batched { flush_interval } => dispatch.batched(results, flush_interval).await,
			};

			match outcome {
				Ok(()) => tracing::debug!(?mode, "Finished dispatch"),
				Err(Cancelled) => tracing::debug!(?mode, "Dispatch cancelled"),
			}
		});

		EventStream {
			events: ReceiverStream::new(rx),
			cancel: self.cancel.clone(),
			_guard: self.cancel.drop_guard(),
		}
	}

	/// Returns a stream with a single [`StreamEvent::Error`], for when the results can't be produced
	pub fn failed(err: &anyhow::Error) -> impl Stream<Item = StreamEvent> {
		tracing::warn!(?err, "Unable to produce results for dispatch");
		futures::stream::iter([StreamEvent::Error {
			message: format!("{err:#}"),
		}])
	}
}

impl Default for StreamDispatcher {
	fn default() -> Self {
		Self::new(DispatchMode::default())
	}
}

/// The dispatch was cancelled
#[derive(Debug)]
struct Cancelled;

/// Dispatch task state
struct Dispatch {
	/// Event sender
	tx: mpsc::Sender<StreamEvent>,

	/// Cancellation token
	cancel: CancellationToken,
}

impl Dispatch {
	/// Sends an event, unless cancelled.
	///
	/// If the receiver is gone, cancels the dispatch.
	async fn send(&self, event: StreamEvent) -> Result<(), Cancelled> {
		if self.cancel.is_cancelled() {
			return Err(Cancelled);
		}

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Cancelled),
			res = self.tx.send(event) => res.map_err(|_| {
				tracing::warn!("Client disconnected mid-stream");
				self.cancel.cancel();
				Cancelled
			}),
		}
	}

	/// Sleeps for `duration`, unless cancelled
	async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Cancelled),
			_ = tokio::time::sleep(duration) => Ok(()),
		}
	}

	/// Emits each result on its own
	async fn paced(&self, mut results: Pin<Box<impl Stream<Item = ThreadResult>>>, delay: Duration) -> Result<(), Cancelled> {
		while let Some(result) = results.next().await {
			self.send(StreamEvent::Result(result)).await?;
			self.sleep(delay).await?;
		}

		self.send(StreamEvent::End { code: SUCCESS_CODE }).await
	}

	/// Emits buffered results every `flush_interval`
	async fn batched(
		&self,
		mut results: Pin<Box<impl Stream<Item = ThreadResult>>>,
		flush_interval: Duration,
	) -> Result<(), Cancelled> {
		// Note: `interval` panics on a zero period
		let mut flush = tokio::time::interval_at(
			tokio::time::Instant::now() + flush_interval,
			flush_interval.max(Duration::from_millis(1)),
		);
		flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut buffer = vec![];
		loop {
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => return Err(Cancelled),
				_ = flush.tick() => {
					if !buffer.is_empty() {
						self.send(StreamEvent::Batch(mem::take(&mut buffer))).await?;
					}
				},
				result = results.next() => match result {
					Some(result) => buffer.push(result),
					None => break,
				},
			}
		}

		if !buffer.is_empty() {
			self.send(StreamEvent::Batch(buffer)).await?;
		}
		self.send(StreamEvent::End { code: SUCCESS_CODE }).await
	}
}

/// Stream of dispatched events.
///
/// Ends as soon as the dispatch is cancelled, even if events are still queued.
/// Cancels the dispatch when dropped.
#[derive(Debug)]
pub struct EventStream {
	/// Events
	events: ReceiverStream<StreamEvent>,

	/// Cancellation token
	cancel: CancellationToken,

	/// Cancels the dispatch on drop
	_guard: DropGuard,
}

impl Stream for EventStream {
	type Item = StreamEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.cancel.is_cancelled() {
			return Poll::Ready(None);
		}

		self.events.poll_next_unpin(cx)
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{Policy, SimulationConfig, Simulator},
	};

	fn results(threads: usize) -> Vec<ThreadResult> {
		let config = SimulationConfig {
			nodes: 4,
			threads,
			blocks: 32,
			policy: Policy::Random,
			pinning: false,
			seed: Some(99),
		};
		Simulator::new().iter(&config).collect()
	}

	#[tokio::test(start_paused = true)]
	async fn paced_delivers_in_order() {
		let expected = self::results(6);
		let start = tokio::time::Instant::now();

		let events = StreamDispatcher::new(DispatchMode::Paced {
			delay: Duration::from_millis(50),
		})
		.dispatch(futures::stream::iter(expected.clone()))
		.collect::<Vec<_>>()
		.await;

		let (end, results) = events.split_last().expect("Stream was empty");
		assert_eq!(*end, StreamEvent::End { code: SUCCESS_CODE });
		assert_eq!(
			results.to_vec(),
			expected.into_iter().map(StreamEvent::Result).collect::<Vec<_>>()
		);
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_millis(6 * 50) && elapsed < Duration::from_millis(7 * 50));
	}

	#[tokio::test(start_paused = true)]
	async fn paced_empty_run_only_ends() {
		let events = StreamDispatcher::default()
			.dispatch(futures::stream::empty())
			.collect::<Vec<_>>()
			.await;
		assert_eq!(events, [StreamEvent::End { code: SUCCESS_CODE }]);
	}

	#[tokio::test(start_paused = true)]
	async fn batched_bounds_event_count() {
		let expected = self::results(40);

		// Note: One result every 10ms over 100ms flushes yields batches of ~10
		let produced = tokio_stream::StreamExt::throttle(tokio_stream::iter(expected.clone()), Duration::from_millis(10));
		let events = StreamDispatcher::new(DispatchMode::Batched {
			flush_interval: Duration::from_millis(100),
		})
		.dispatch(produced)
		.collect::<Vec<_>>()
		.await;

		let (end, batches) = events.split_last().expect("Stream was empty");
		assert_eq!(*end, StreamEvent::End { code: SUCCESS_CODE });
		assert!(batches.len() >= 2 && batches.len() <= 6, "Unexpected batch count: {}", batches.len());

		let delivered = batches
			.iter()
			.flat_map(|event| match event {
				StreamEvent::Batch(batch) => batch.clone(),
				event => panic!("Unexpected event: {event:?}"),
			})
			.collect::<Vec<_>>();
		assert_eq!(delivered, expected);
	}

	#[tokio::test(start_paused = true)]
	async fn batched_flushes_remainder_before_end() {
		let expected = self::results(3);
		let events = StreamDispatcher::new(DispatchMode::Batched {
			flush_interval: Duration::from_secs(60),
		})
		.dispatch(futures::stream::iter(expected.clone()))
		.collect::<Vec<_>>()
		.await;

		assert_eq!(events, [StreamEvent::Batch(expected), StreamEvent::End {
			code: SUCCESS_CODE
		}]);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_stops_dispatch() {
		let dispatcher = StreamDispatcher::new(DispatchMode::Paced {
			delay: Duration::from_millis(50),
		});
		let cancel = dispatcher.cancellation_token();
		let mut events = dispatcher.dispatch(futures::stream::iter(self::results(10)));

		assert!(matches!(events.next().await, Some(StreamEvent::Result(_))));
		assert!(matches!(events.next().await, Some(StreamEvent::Result(_))));
		cancel.cancel();

		assert_eq!(events.next().await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_discards_queued_events() {
		let dispatcher = StreamDispatcher::new(DispatchMode::Paced {
			delay: Duration::from_millis(1),
		});
		let cancel = dispatcher.cancellation_token();
		let events = dispatcher.dispatch(futures::stream::iter(self::results(3)));

		// Let the dispatch queue every result and the end event
		tokio::time::sleep(Duration::from_millis(100)).await;
		cancel.cancel();

		let events = events.collect::<Vec<_>>().await;
		assert!(events.is_empty(), "Events after cancellation: {events:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_stream_cancels() {
		let dispatcher = StreamDispatcher::new(DispatchMode::Paced {
			delay: Duration::from_millis(50),
		});
		let cancel = dispatcher.cancellation_token();
		let mut events = dispatcher.dispatch(futures::stream::iter(self::results(10)));

		assert!(events.next().await.is_some());
		drop(events);
		assert!(cancel.is_cancelled());
	}

	#[tokio::test]
	async fn failed_stream() {
		let err = anyhow::anyhow!("Engine exited with 3");
		let events = StreamDispatcher::failed(&err).collect::<Vec<_>>().await;
		assert_eq!(events, [StreamEvent::Error {
			message: "Engine exited with 3".to_owned(),
		}]);
	}
}
