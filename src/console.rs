//! 行式控制台前端
//!
//! 从输入逐行读取用户消息交给 Session，回复写回输出。`/new` 丢弃当前线程开始新对话，
//! `/quit` 或输入结束时退出。收到关闭信号时停止读取；正在处理的消息会先取消远端 Run 再返回。

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::core::{Session, ShutdownReason};

pub const WELCOME: &str = "Welcome to the Nasdaq Stock Assistant! How can I help you?";

/// 控制台命令
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    NewConversation,
    Quit,
    Message(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/new" => Input::NewConversation,
        "/quit" | "/exit" => Input::Quit,
        text => Input::Message(text),
    }
}

/// 运行控制台循环，返回退出原因
pub async fn run<R, W>(
    session: &mut Session,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> std::io::Result<ShutdownReason>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(format!("{WELCOME}\n> ").as_bytes()).await?;
    output.flush().await?;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(ShutdownReason::Signal),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(ShutdownReason::InputClosed);
        };

        match classify(&line) {
            Input::Empty => {}
            Input::Quit => return Ok(ShutdownReason::UserInitiated),
            Input::NewConversation => {
                session.cleanup().await;
                output.write_all(b"Started a new conversation.\n").await?;
            }
            Input::Message(text) => {
                let reply = session.process_message_until(text, &shutdown).await;
                if shutdown.is_cancelled() {
                    return Ok(ShutdownReason::Signal);
                }
                output.write_all(format!("{reply}\n").as_bytes()).await?;
            }
        }
        output.write_all(b"> ").await?;
        output.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("  "), Input::Empty);
        assert_eq!(classify("/new"), Input::NewConversation);
        assert_eq!(classify(" /quit "), Input::Quit);
        assert_eq!(classify(" price of MSFT? "), Input::Message("price of MSFT?"));
    }
}
