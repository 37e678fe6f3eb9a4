use std::time::Duration;

use crossbeam_channel::{bounded, Receiver as CbReceiver, Sender as CbSender};

pub struct Sender<T> {
    inner: CbSender<T>,
}

pub struct Receiver<T> {
    inner: CbReceiver<T>,
}

pub fn channel<T>(bound: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = bounded(bound);
    (Sender { inner: tx }, Receiver { inner: rx })
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Sender<T> {
    pub fn send(&self, item: T) -> Result<(), ()> {
        self.inner.send(item).map_err(|_| ())
    }

    pub fn try_send(&self, item: T) -> Result<(), ()> {
        self.inner.try_send(item).map_err(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Disconnected,
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Result<T, ()> {
        self.inner.try_recv().map_err(|_| ())
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.inner.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => RecvTimeoutError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => RecvTimeoutError::Disconnected,
        })
    }
}
