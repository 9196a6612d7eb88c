#![forbid(unsafe_code)]

//! The fixed menu of analytic questions offered by the browser UI.
//!
//! Each question is bound to one hand-written SQLite statement with a fixed
//! column schema. The statements are literal by design; nothing here is
//! parameterized or user-supplied.

/// One menu entry: the natural-language question, the statement answering
/// it, and the column headers the UI renders.
pub struct ReportQuery {
    pub id: u8,
    pub question: &'static str,
    pub columns: &'static [&'static str],
    pub sql: &'static str,
}

pub fn find_report(id: u8) -> Option<&'static ReportQuery> {
    REPORT_QUERIES.iter().find(|report| report.id == id)
}

pub const REPORT_QUERIES: [ReportQuery; 10] = [
    ReportQuery {
        id: 1,
        question: "What are the names of all the videos and their corresponding channels?",
        columns: &["Video_Title", "Channel_Name"],
        sql: r#"
            SELECT v.title AS Video_Title, c.channel_name AS Channel_Name
            FROM videos v
            INNER JOIN channels c ON v.channel_id = c.channel_id
        "#,
    },
    ReportQuery {
        id: 2,
        question: "Which channels have the most number of videos, and how many videos do they have?",
        columns: &["Channel_Name", "Video_Count"],
        sql: r#"
            SELECT c.channel_name AS Channel_Name, COUNT(*) AS Video_Count
            FROM videos v
            INNER JOIN channels c ON v.channel_id = c.channel_id
            GROUP BY v.channel_id
            ORDER BY Video_Count DESC
        "#,
    },
    ReportQuery {
        id: 3,
        question: "What are the top 10 most viewed videos and their respective channels?",
        columns: &["Video_Name", "Channel_Name", "Views_Count"],
        sql: r#"
            SELECT v.title AS Video_Name, c.channel_name AS Channel_Name, v.views AS Views_Count
            FROM videos v
            INNER JOIN channels c ON v.channel_id = c.channel_id
            ORDER BY v.views DESC
            LIMIT 10
        "#,
    },
    ReportQuery {
        id: 4,
        question: "How many comments were made on each video, and what are their corresponding video names?",
        columns: &["Video_Name", "Comment_Count"],
        sql: r#"
            SELECT v.title AS Video_Name, COUNT(c.comment_id) AS Comment_Count
            FROM videos v
            LEFT JOIN comments c ON v.video_id = c.video_id
            GROUP BY v.video_id
        "#,
    },
    ReportQuery {
        id: 5,
        question: "Which videos have the highest number of likes, and what are their corresponding channel names?",
        columns: &["Video_Name", "Channel_Name", "Like_Count"],
        sql: r#"
            SELECT v.title AS Video_Name, c.channel_name AS Channel_Name, v.likes AS Like_Count
            FROM videos v
            INNER JOIN channels c ON v.channel_id = c.channel_id
            ORDER BY v.likes DESC
            LIMIT 10
        "#,
    },
    ReportQuery {
        id: 6,
        question: "What is the total number of likes and dislikes for each video, and what are their corresponding video names?",
        columns: &["Video_Name", "Total_Likes", "Total_Dislikes"],
        sql: r#"
            SELECT v.title AS Video_Name, SUM(v.likes) AS Total_Likes, SUM(v.dislikes) AS Total_Dislikes
            FROM videos v
            GROUP BY v.video_id
        "#,
    },
    ReportQuery {
        id: 7,
        question: "What is the total number of views for each channel, and what are their corresponding channel names?",
        columns: &["Channel_Name", "Total_Views"],
        sql: r#"
            SELECT c.channel_name AS Channel_Name, SUM(v.views) AS Total_Views
            FROM channels c
            INNER JOIN videos v ON c.channel_id = v.channel_id
            GROUP BY c.channel_id
        "#,
    },
    ReportQuery {
        id: 8,
        question: "What are the names of all the channels that have published videos in the year 2022 and 2023?",
        columns: &["Channel_Name"],
        sql: r#"
            SELECT DISTINCT c.channel_name AS Channel_Name
            FROM channels c
            INNER JOIN videos v ON c.channel_id = v.channel_id
            WHERE strftime('%Y', v.published_at) IN ('2022', '2023')
        "#,
    },
    ReportQuery {
        id: 9,
        question: "What is the average duration of all videos in each channel, and what are their corresponding channel names?",
        columns: &["Channel_Name", "Avg_Duration"],
        // Durations are stored as HH:MM:SS text; average the seconds and
        // render back through printf.
        sql: r#"
            SELECT channel_name AS Channel_Name,
                   printf('%02d:%02d:%02d',
                          CAST(avg_secs AS INTEGER) / 3600,
                          CAST(avg_secs AS INTEGER) % 3600 / 60,
                          CAST(avg_secs AS INTEGER) % 60) AS Avg_Duration
            FROM (
                SELECT c.channel_name AS channel_name,
                       AVG(CAST(substr(v.duration, 1, 2) AS INTEGER) * 3600
                         + CAST(substr(v.duration, 4, 2) AS INTEGER) * 60
                         + CAST(substr(v.duration, 7, 2) AS INTEGER)) AS avg_secs
                FROM channels c
                INNER JOIN videos v ON c.channel_id = v.channel_id
                GROUP BY c.channel_id
            )
        "#,
    },
    ReportQuery {
        id: 10,
        question: "Which videos have the highest number of comments, and what are their corresponding channel names?",
        columns: &["Video_Name", "Channel_Name", "Comment_Count"],
        sql: r#"
            SELECT v.title AS Video_Name, ch.channel_name AS Channel_Name,
                   COUNT(co.comment_id) AS Comment_Count
            FROM videos v
            INNER JOIN channels ch ON v.channel_id = ch.channel_id
            LEFT JOIN comments co ON v.video_id = co.video_id
            GROUP BY v.video_id
            ORDER BY Comment_Count DESC
            LIMIT 10
        "#,
    },
];
